use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Deserialize;
use shared::domain::{GroupKey, ImageId};

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: ImageId,
    group: GroupKey,
}

/// Images available to each group's selection screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCatalog {
    groups: BTreeMap<GroupKey, Vec<ImageId>>,
}

impl ImageCatalog {
    /// Reads a JSON array of `{ "id": …, "group": "groupN" }` entries.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read image catalog '{}'", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("invalid image catalog '{}'", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(raw)?;
        let mut groups: BTreeMap<GroupKey, Vec<ImageId>> = BTreeMap::new();
        for entry in entries {
            let images = groups.entry(entry.group).or_default();
            if images.contains(&entry.id) {
                return Err(anyhow!("image '{}' listed twice in {}", entry.id, entry.group));
            }
            images.push(entry.id);
        }
        Ok(Self { groups })
    }

    /// `per_group` generated images for every group, named `groupK-imgN`.
    pub fn synthetic(per_group: usize) -> Self {
        let groups = GroupKey::ALL
            .into_iter()
            .map(|group| {
                let images = (0..per_group)
                    .map(|n| ImageId(format!("{group}-img{n}")))
                    .collect();
                (group, images)
            })
            .collect();
        Self { groups }
    }

    pub fn images(&self, group: GroupKey) -> &[ImageId] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, group: GroupKey, image: &ImageId) -> bool {
        self.images(group).contains(image)
    }

    /// The group's images in session order. The same seed always yields the
    /// same order, so a resumed session sees the pool it left.
    pub fn pool_for(&self, group: GroupKey, seed: u64) -> Vec<ImageId> {
        let mut pool = self.images(group).to_vec();
        let mut rng = StdRng::seed_from_u64(seed ^ (group.index() as u64).rotate_left(32));
        pool.shuffle(&mut rng);
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(index: usize) -> GroupKey {
        GroupKey::new(index).unwrap()
    }

    #[test]
    fn json_catalog_groups_entries() {
        let catalog = ImageCatalog::from_json(
            r#"[
                {"id": "curb-1", "group": "group0"},
                {"id": "curb-2", "group": "group0"},
                {"id": "ramp-1", "group": "group4"}
            ]"#,
        )
        .unwrap();

        assert_eq!(catalog.images(group(0)).len(), 2);
        assert!(catalog.contains(group(4), &ImageId::from("ramp-1")));
        assert!(!catalog.contains(group(0), &ImageId::from("ramp-1")));
        assert!(catalog.images(group(8)).is_empty());
    }

    #[test]
    fn json_catalog_rejects_duplicates_and_bad_groups() {
        let duplicate = ImageCatalog::from_json(
            r#"[{"id": "a", "group": "group1"}, {"id": "a", "group": "group1"}]"#,
        );
        assert!(duplicate.is_err());

        let bad_group = ImageCatalog::from_json(r#"[{"id": "a", "group": "group9"}]"#);
        assert!(bad_group.is_err());
    }

    #[test]
    fn pools_are_stable_per_seed() {
        let catalog = ImageCatalog::synthetic(12);
        let first = catalog.pool_for(group(2), 77);
        assert_eq!(first, catalog.pool_for(group(2), 77));
        assert_eq!(first.len(), 12);

        let mut sorted = first.clone();
        sorted.sort();
        let mut expected = catalog.images(group(2)).to_vec();
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn synthetic_ids_name_their_group() {
        let catalog = ImageCatalog::synthetic(2);
        assert_eq!(
            catalog.images(group(3)),
            &[ImageId::from("group3-img0"), ImageId::from("group3-img1")]
        );
    }
}
