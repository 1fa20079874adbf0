//! Layouts, columns and archetypes.
//!
//! An archetype groups every entity whose set of component types (its
//! [`Layout`]) is identical. Entities are appended on insertion and removed
//! by swapping the last row into the vacated slot, so rows stay dense.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::ComponentTypeId;
use crate::entity::Entity;

/// Position of an archetype in the store's archetype list.
///
/// Archetypes are only ever appended, so an index stays valid for the
/// lifetime of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchetypeIndex(pub usize);

impl fmt::Display for ArchetypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Archetype({})", self.0)
    }
}

/// The set of component types defining an archetype.
///
/// Equality is set equality: the order components were supplied in is
/// irrelevant, and duplicates collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Layout(BTreeSet<ComponentTypeId>);

impl Layout {
    /// Build a layout from component type IDs.
    pub fn new(types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        Self(types.into_iter().collect())
    }

    /// Returns `true` if the layout includes `type_id`.
    #[must_use]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.0.contains(&type_id)
    }

    /// Returns `true` if the layout is a superset of `types`.
    #[must_use]
    pub fn contains_all(&self, types: &[ComponentTypeId]) -> bool {
        types.iter().all(|t| self.0.contains(t))
    }

    /// Returns `true` if the layout is set-equal to `types`.
    #[must_use]
    pub fn is_exactly(&self, types: &[ComponentTypeId]) -> bool {
        if !self.contains_all(types) {
            return false;
        }
        let distinct: BTreeSet<&ComponentTypeId> = types.iter().collect();
        distinct.len() == self.0.len()
    }

    /// A copy of this layout with `type_id` added.
    #[must_use]
    pub fn with(&self, type_id: ComponentTypeId) -> Self {
        let mut set = self.0.clone();
        set.insert(type_id);
        Self(set)
    }

    /// A copy of this layout with `type_id` removed.
    #[must_use]
    pub fn without(&self, type_id: ComponentTypeId) -> Self {
        let mut set = self.0.clone();
        set.remove(&type_id);
        Self(set)
    }

    /// Iterate the component types in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.0.iter().copied()
    }

    /// Number of component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the layout has no component types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A column in an archetype, storing the encoded values of one component
/// type. `values[i]` belongs to the archetype's row `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// The component type stored in this column.
    pub type_id: ComponentTypeId,
    /// MessagePack-encoded component values, one per row.
    pub values: Vec<Vec<u8>>,
}

impl Column {
    /// Create a new empty column for the given component type.
    #[must_use]
    pub fn new(type_id: ComponentTypeId) -> Self {
        Self {
            type_id,
            values: Vec::new(),
        }
    }

    /// Returns the number of values stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if this column contains no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Values displaced by [`Archetype::swap_remove`].
#[derive(Debug)]
pub struct SwapRemoved {
    /// The removed entity's values, keyed by component type.
    pub values: BTreeMap<ComponentTypeId, Vec<u8>>,
    /// The entity that was moved into the vacated row, if any.
    pub moved: Option<Entity>,
}

/// A dense group of entities sharing one [`Layout`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archetype {
    /// Position in the store's archetype list.
    pub index: ArchetypeIndex,
    /// The component types every entity here carries.
    pub layout: Layout,
    /// Entity IDs in row order. `entities[i]` corresponds to row `i` in every
    /// column.
    pub entities: Vec<Entity>,
    /// One column per component type, in layout order.
    pub columns: Vec<Column>,
}

impl Archetype {
    /// Create an empty archetype.
    #[must_use]
    pub fn new(index: ArchetypeIndex, layout: Layout) -> Self {
        let columns = layout.iter().map(Column::new).collect();
        Self {
            index,
            layout,
            entities: Vec::new(),
            columns,
        }
    }

    /// Returns the number of entities in this archetype.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if this archetype has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns the column index for the given component type, if present.
    #[must_use]
    pub fn column_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.columns.iter().position(|c| c.type_id == type_id)
    }

    /// Append an entity with one value per layout component and return its
    /// row. `values` must cover the layout exactly.
    pub(crate) fn push(
        &mut self,
        entity: Entity,
        mut values: BTreeMap<ComponentTypeId, Vec<u8>>,
    ) -> usize {
        debug_assert_eq!(values.len(), self.columns.len());
        for column in &mut self.columns {
            column
                .values
                .push(values.remove(&column.type_id).unwrap_or_default());
        }
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Remove `row` by moving the last row into it.
    pub(crate) fn swap_remove(&mut self, row: usize) -> SwapRemoved {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        let values = self
            .columns
            .iter_mut()
            .map(|column| (column.type_id, column.values.swap_remove(row)))
            .collect();
        let moved = (row != last).then(|| self.entities[row]);
        SwapRemoved { values, moved }
    }

    /// Encoded value of `type_id` at `row`.
    #[must_use]
    pub fn get(&self, row: usize, type_id: ComponentTypeId) -> Option<&[u8]> {
        let column = &self.columns[self.column_index(type_id)?];
        column.values.get(row).map(Vec::as_slice)
    }

    /// Replace the encoded value of `type_id` at `row`. Returns `false` if
    /// the column or row does not exist.
    pub(crate) fn set(&mut self, row: usize, type_id: ComponentTypeId, bytes: Vec<u8>) -> bool {
        let Some(col) = self.column_index(type_id) else {
            return false;
        };
        match self.columns[col].values.get_mut(row) {
            Some(slot) => {
                *slot = bytes;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(ids: &[u32]) -> Layout {
        Layout::new(ids.iter().map(|&i| ComponentTypeId(i)))
    }

    fn row(ids: &[u32], tag: u8) -> BTreeMap<ComponentTypeId, Vec<u8>> {
        ids.iter().map(|&i| (ComponentTypeId(i), vec![tag])).collect()
    }

    #[test]
    fn test_layout_order_independent() {
        assert_eq!(layout(&[1, 2]), layout(&[2, 1]));
        assert_eq!(layout(&[1, 1, 2]), layout(&[1, 2]));
    }

    #[test]
    fn test_layout_exact_and_contains() {
        let l = layout(&[1, 2]);
        assert!(l.contains_all(&[ComponentTypeId(1)]));
        assert!(l.is_exactly(&[ComponentTypeId(2), ComponentTypeId(1)]));
        assert!(l.is_exactly(&[ComponentTypeId(2), ComponentTypeId(1), ComponentTypeId(1)]));
        assert!(!l.is_exactly(&[ComponentTypeId(1)]));
        assert!(!l.contains_all(&[ComponentTypeId(3)]));
    }

    #[test]
    fn test_push_and_get() {
        let mut arch = Archetype::new(ArchetypeIndex(0), layout(&[1, 2]));
        let r = arch.push(Entity(7), row(&[1, 2], 9));
        assert_eq!(r, 0);
        assert_eq!(arch.get(0, ComponentTypeId(2)), Some(&[9u8][..]));
        assert_eq!(arch.get(0, ComponentTypeId(3)), None);
    }

    #[test]
    fn test_swap_remove_reports_moved_entity() {
        let mut arch = Archetype::new(ArchetypeIndex(0), layout(&[1]));
        arch.push(Entity(1), row(&[1], 1));
        arch.push(Entity(2), row(&[1], 2));
        arch.push(Entity(3), row(&[1], 3));

        let removed = arch.swap_remove(0);
        assert_eq!(removed.moved, Some(Entity(3)));
        assert_eq!(removed.values[&ComponentTypeId(1)], vec![1]);
        assert_eq!(arch.entities, vec![Entity(3), Entity(2)]);
        assert_eq!(arch.get(0, ComponentTypeId(1)), Some(&[3u8][..]));

        let removed = arch.swap_remove(1);
        assert_eq!(removed.moved, None);
        assert_eq!(arch.len(), 1);
    }
}
