mod common;

use std::sync::{Arc, Mutex};

use common::{NAMESPACE, Position, Steer, SteerMessage, archetype_bytes, config, movement_world};
use engine_app::{World, WorldError};
use engine_component::Entity;
use engine_net::{
    Epoch, MessageRegistry, NetError, PageResponse, QueryTransactionsRequest,
    QueryTransactionsResponse, ShardFeed, ShardIterator, Transaction, TxData,
};
use engine_net::shard::page_key;

/// An in-memory shard log served `page_size` epochs at a time.
struct LogFeed {
    epochs: Vec<Epoch>,
    page_size: usize,
    requests: Mutex<Vec<u64>>,
}

impl ShardFeed for LogFeed {
    fn query_transactions(
        &self,
        request: &QueryTransactionsRequest,
    ) -> Result<QueryTransactionsResponse, NetError> {
        let start = request
            .page
            .as_ref()
            .and_then(|p| <[u8; 8]>::try_from(p.key.as_slice()).ok())
            .map_or(0, u64::from_be_bytes);
        self.requests.lock().unwrap().push(start);

        let rest: Vec<Epoch> = self
            .epochs
            .iter()
            .filter(|e| e.epoch >= start)
            .cloned()
            .collect();
        let page: Vec<Epoch> = rest.iter().take(self.page_size).cloned().collect();
        let continuation = rest.get(self.page_size).map(|next| PageResponse {
            key: page_key(next.epoch),
        });
        Ok(QueryTransactionsResponse {
            epochs: page,
            page: continuation,
        })
    }
}

fn steer_data(steer: &SteerMessage, target: u64, dx: i64) -> TxData {
    let body = steer
        .encode(&Steer {
            target: Entity(target),
            dx,
            dy: 0,
        })
        .unwrap();
    let tx = Transaction::new("pilot", NAMESPACE, 0, body);
    TxData {
        message_id: u64::from(steer.id().0),
        payload: tx.to_bytes().unwrap(),
    }
}

fn log(steer: &SteerMessage, epochs: u64) -> Vec<Epoch> {
    (0..epochs)
        .map(|epoch| Epoch {
            epoch,
            unix_timestamp: 1_000 + epoch,
            txs: if epoch % 2 == 0 {
                vec![steer_data(steer, 1, epoch as i64)]
            } else {
                Vec::new()
            },
        })
        .collect()
}

fn feed(epochs: Vec<Epoch>) -> Arc<LogFeed> {
    Arc::new(LogFeed {
        epochs,
        page_size: 3,
        requests: Mutex::new(Vec::new()),
    })
}

fn iterator(world: &World, epochs: Vec<Epoch>) -> ShardIterator<Arc<LogFeed>> {
    ShardIterator::new(world.messages(), NAMESPACE, feed(epochs))
}

#[test]
fn test_replay_runs_one_tick_per_epoch() {
    let (mut world, steer) = movement_world(config());
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&stamps);
    world
        .register_system("stamps", move |ctx| {
            recorder.lock().unwrap().push(ctx.timestamp());
            Ok(())
        })
        .unwrap();
    world.start().unwrap();

    let iter = iterator(&world, log(&steer, 7));
    let reports = world.replay_from_shard(&iter, None, None).unwrap();

    assert_eq!(reports.len(), 7);
    assert_eq!(world.current_tick(), 7);
    let handled: Vec<usize> = reports.iter().map(|r| r.receipts).collect();
    assert_eq!(handled, vec![1, 0, 1, 0, 1, 0, 1]);
    assert_eq!(*stamps.lock().unwrap(), (1_000..1_007).collect::<Vec<u64>>());
    assert!(world.receipts().for_tick(6).unwrap()[0].is_success());
}

#[test]
fn test_replay_matches_live_run() {
    let (mut replayed, steer) = movement_world(config());
    replayed.start().unwrap();
    let iter = iterator(&replayed, log(&steer, 6));
    replayed.replay_from_shard(&iter, None, None).unwrap();

    let (mut live, steer) = movement_world(config());
    live.start().unwrap();
    let submitter = live.submitter().unwrap();
    for epoch in 0..6u64 {
        if epoch % 2 == 0 {
            let body = steer
                .encode(&Steer {
                    target: Entity(1),
                    dx: epoch as i64,
                    dy: 0,
                })
                .unwrap();
            let tx = Transaction::new("pilot", NAMESPACE, 0, body);
            submitter.submit_at(steer.id(), tx, 0).unwrap();
        }
        live.tick_at(1_000 + epoch).unwrap();
    }

    assert_eq!(archetype_bytes(&replayed), archetype_bytes(&live));
    let first = replayed
        .store()
        .get::<Position>(replayed.components(), Entity(1))
        .unwrap();
    // Velocity set to 0, 0, 2, 2, 4, 4 over six ticks.
    assert_eq!(first, Position { x: 12, y: 0 });
}

#[test]
fn test_replay_stops_inclusively_and_resumes() {
    let (mut world, steer) = movement_world(config());
    world.start().unwrap();
    let feed = feed(log(&steer, 8));
    let iter = ShardIterator::new(world.messages(), NAMESPACE, Arc::clone(&feed));

    let reports = world.replay_from_shard(&iter, None, Some(3)).unwrap();
    assert_eq!(reports.len(), 4);
    assert_eq!(world.current_tick(), 4);

    let reports = world.replay_from_shard(&iter, None, None).unwrap();
    assert_eq!(reports.first().map(|r| r.tick), Some(4));
    assert_eq!(world.current_tick(), 8);
    assert_eq!(*feed.requests.lock().unwrap(), vec![0, 3, 4, 7]);
}

#[test]
fn test_replay_rejects_gap() {
    let (mut world, steer) = movement_world(config());
    world.start().unwrap();
    let mut epochs = log(&steer, 4);
    epochs.remove(1);
    let iter = iterator(&world, epochs);

    let err = world.replay_from_shard(&iter, None, None).unwrap_err();
    assert!(matches!(err, WorldError::Net(NetError::Callback(_))));
    assert!(err.to_string().contains("shard epoch 2 does not match world tick 1"));
    assert_eq!(world.current_tick(), 1);
}

#[test]
fn test_replay_unknown_message_is_fatal() {
    let (mut world, steer) = movement_world(config());
    world.start().unwrap();
    let mut epochs = log(&steer, 2);
    epochs[1].txs.push(TxData {
        message_id: 99,
        payload: Vec::new(),
    });
    let iter = iterator(&world, epochs);

    let err = world.replay_from_shard(&iter, None, None).unwrap_err();
    assert!(matches!(err, WorldError::Net(NetError::UnknownMessage(99))));
    assert_eq!(world.current_tick(), 1);
}

#[test]
fn test_replay_requires_running_world() {
    let (mut world, steer) = movement_world(config());
    let epochs = log(&steer, 1);
    let iter = ShardIterator::new(Arc::new(MessageRegistry::new()), NAMESPACE, feed(epochs));
    assert!(matches!(
        world.replay_from_shard(&iter, None, None),
        Err(WorldError::NotRunning(_))
    ));
}
