//! Reduce a BOM tree into raw material and sub-component totals

use std::collections::BTreeMap;

use crate::models::{FlatBom, ItemId, MaterialNode};

/// Collapse `tree` into totals.
///
/// Contributions for the same item are summed in ascending order so the
/// result does not depend on sibling order in the source recipes.
pub fn flatten(tree: &MaterialNode) -> FlatBom {
    let mut raw: BTreeMap<ItemId, Vec<f64>> = BTreeMap::new();
    let mut built: BTreeMap<ItemId, Vec<f64>> = BTreeMap::new();
    let mut flat = FlatBom::default();

    collect(tree, true, &mut raw, &mut built, &mut flat);

    flat.raw_materials = sum_contributions(raw);
    flat.intermediates = sum_contributions(built);
    flat
}

fn collect(
    node: &MaterialNode,
    is_root: bool,
    raw: &mut BTreeMap<ItemId, Vec<f64>>,
    built: &mut BTreeMap<ItemId, Vec<f64>>,
    flat: &mut FlatBom,
) {
    if node.is_raw_material || node.is_unresolved() {
        raw.entry(node.item_name.clone())
            .or_default()
            .push(node.quantity_required);
        if node.is_unresolved() {
            flat.unresolved.insert(node.item_name.clone());
        }
        return;
    }

    if !is_root {
        built
            .entry(node.item_name.clone())
            .or_default()
            .push(node.quantity_required);
    }
    for child in &node.children {
        collect(child, false, raw, built, flat);
    }
}

fn sum_contributions(parts: BTreeMap<ItemId, Vec<f64>>) -> BTreeMap<ItemId, f64> {
    parts
        .into_iter()
        .map(|(item, mut quantities)| {
            quantities.sort_by(f64::total_cmp);
            (item, quantities.into_iter().sum())
        })
        .collect()
}

impl FlatBom {
    pub fn raw_quantity(&self, item: &str) -> Option<f64> {
        self.raw_materials.get(item).copied()
    }

    pub fn intermediate_quantity(&self, item: &str) -> Option<f64> {
        self.intermediates.get(item).copied()
    }

    pub fn has_unresolved(&self) -> bool {
        !self.unresolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn leaf(name: &str, quantity: f64, source_kind: SourceKind) -> MaterialNode {
        MaterialNode {
            item_name: ItemId::new(name).unwrap(),
            quantity_required: quantity,
            is_raw_material: true,
            source_kind,
            output_per_run: 1,
            time_per_run_seconds: 0.0,
            production_time_seconds: 0.0,
            children: vec![],
        }
    }

    fn built(name: &str, quantity: f64, children: Vec<MaterialNode>) -> MaterialNode {
        MaterialNode {
            item_name: ItemId::new(name).unwrap(),
            quantity_required: quantity,
            is_raw_material: false,
            source_kind: SourceKind::SdeReference,
            output_per_run: 1,
            time_per_run_seconds: 10.0,
            production_time_seconds: 10.0 * quantity,
            children,
        }
    }

    fn sample_tree() -> MaterialNode {
        built(
            "Kestrel",
            1.0,
            vec![
                built(
                    "Light Missile Launcher I",
                    4.0,
                    vec![leaf("Tritanium", 400.0, SourceKind::RawMaterial)],
                ),
                leaf("Tritanium", 30000.0, SourceKind::RawMaterial),
                leaf("Mystery Alloy", 2.0, SourceKind::Unresolved),
            ],
        )
    }

    #[test]
    fn sums_raw_materials_across_branches() {
        let flat = flatten(&sample_tree());
        assert_eq!(flat.raw_quantity("Tritanium"), Some(30400.0));
        assert_eq!(flat.raw_quantity("Mystery Alloy"), Some(2.0));
        assert_eq!(flat.raw_materials.len(), 2);
    }

    #[test]
    fn records_intermediates_without_root() {
        let flat = flatten(&sample_tree());
        assert_eq!(flat.intermediate_quantity("Light Missile Launcher I"), Some(4.0));
        assert_eq!(flat.intermediate_quantity("Kestrel"), None);
    }

    #[test]
    fn flags_unresolved_leaves() {
        let flat = flatten(&sample_tree());
        assert!(flat.has_unresolved());
        assert!(flat.unresolved.contains("Mystery Alloy"));
    }

    #[test]
    fn raw_root_is_its_own_total() {
        let flat = flatten(&leaf("Tritanium", 5.0, SourceKind::RawMaterial));
        assert_eq!(flat.raw_quantity("Tritanium"), Some(5.0));
        assert!(flat.intermediates.is_empty());
    }

    #[test]
    fn flattening_is_idempotent() {
        let tree = sample_tree();
        assert_eq!(flatten(&tree), flatten(&tree));
    }

    #[test]
    fn sibling_order_does_not_change_totals() {
        let parts = [0.1, 0.2, 0.3, 1e16, 1.0];
        let forward = built(
            "Root",
            1.0,
            parts.iter().map(|q| leaf("Ore", *q, SourceKind::RawMaterial)).collect(),
        );
        let backward = built(
            "Root",
            1.0,
            parts.iter().rev().map(|q| leaf("Ore", *q, SourceKind::RawMaterial)).collect(),
        );
        assert_eq!(
            flatten(&forward).raw_quantity("Ore").unwrap().to_bits(),
            flatten(&backward).raw_quantity("Ore").unwrap().to_bits()
        );
    }
}
