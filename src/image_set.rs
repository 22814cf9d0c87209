//! Bulk operations over a collection of images: deduplicated size, bulk
//! delete, and set diffing by image name.

use crate::distribution::AuthConfig;
use crate::image::Image;
use crate::manifest::ManifestKind;
use crate::Error;
use std::collections::{HashMap, HashSet};

/// An ordered collection of [`Image`]s.
#[derive(Debug, Default)]
pub struct ImageSet {
    images: Vec<Image>,
}

impl ImageSet {
    pub fn new(images: Vec<Image>) -> Self {
        ImageSet { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.images.iter()
    }

    /// Total size across every image in the set: entry sizes summed verbatim,
    /// configs and layers deduplicated by digest across ALL images.
    pub async fn size(&self, auth: &AuthConfig) -> Result<u64, Error> {
        let mut seen_configs = HashSet::new();
        let mut seen_layers = HashSet::new();
        let mut total = 0u64;

        for image in &self.images {
            match image.manifest(auth).await? {
                ManifestKind::V2S2Manifest(m) | ManifestKind::OciManifest(m) => {
                    if seen_configs.insert(m.config_descriptor().digest().to_string()) {
                        total += m.config_descriptor().size();
                    }
                    for layer in m.layer_descriptors() {
                        if seen_layers.insert(layer.digest().to_string()) {
                            total += layer.size();
                        }
                    }
                }
                ManifestKind::V2S2List(list) | ManifestKind::OciIndex(list) => {
                    let children = futures::future::try_join_all(
                        list.entries()
                            .iter()
                            .map(|entry| image.child_manifest(entry.digest(), auth)),
                    )
                    .await?;
                    total += crate::manifest::aggregate_fat_manifest_size(
                        &list,
                        &children,
                        &mut seen_configs,
                        &mut seen_layers,
                    );
                }
            }
        }
        Ok(total)
    }

    /// Deletes every image in the set.
    pub async fn delete(&self, auth: &AuthConfig) -> Result<(), Error> {
        for image in &self.images {
            image.delete(auth).await?;
        }
        Ok(())
    }

    /// Groups this set and `previous` by image name, classifying each name
    /// into added/removed/updated/common based on identifier equality.
    pub fn diff(&self, previous: &ImageSet) -> Diff {
        let current: HashMap<String, &Image> = self
            .images
            .iter()
            .map(|i| (i.reference().name(), i))
            .collect();
        let prior: HashMap<String, &Image> = previous
            .images
            .iter()
            .map(|i| (i.reference().name(), i))
            .collect();

        let mut added = Vec::new();
        let mut updated = Vec::new();
        let mut common = Vec::new();
        for (name, image) in &current {
            match prior.get(name) {
                None => added.push(clone_image(image)),
                Some(prior_image) => {
                    if image.reference().identifier() == prior_image.reference().identifier() {
                        common.push(clone_image(image));
                    } else {
                        updated.push(clone_image(image));
                    }
                }
            }
        }
        let removed: Vec<Image> = prior
            .iter()
            .filter(|(name, _)| !current.contains_key(*name))
            .map(|(_, image)| clone_image(image))
            .collect();

        Diff {
            added: ImageSet::new(added),
            removed: ImageSet::new(removed),
            updated: ImageSet::new(updated),
            common: ImageSet::new(common),
        }
    }
}

fn clone_image(image: &Image) -> Image {
    Image::new(image.reference().clone())
}

impl<'a> IntoIterator for &'a ImageSet {
    type Item = &'a Image;
    type IntoIter = std::slice::Iter<'a, Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

impl IntoIterator for ImageSet {
    type Item = Image;
    type IntoIter = std::vec::IntoIter<Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.into_iter()
    }
}

/// Four [`ImageSet`]s produced by [`ImageSet::diff`]: added, removed, updated,
/// and common, grouped by image name (not full reference).
#[derive(Debug)]
pub struct Diff {
    pub added: ImageSet,
    pub removed: ImageSet,
    pub updated: ImageSet,
    pub common: ImageSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    fn img(s: &str) -> Image {
        Image::new(s.parse().unwrap())
    }

    // S7 — Image diff.
    #[test]
    fn diff_groups_by_name() {
        let current = ImageSet::new(vec![
            img("docker.io/library/img1:a"),
            img("docker.io/library/img2:t"),
            img("docker.io/library/img3@sha256:1111111111111111111111111111111111111111111111111111111111111111"),
            img("docker.io/library/new5:t"),
        ]);
        let previous = ImageSet::new(vec![
            img("docker.io/library/img1:b"),
            img("docker.io/library/img2:t"),
            img("docker.io/library/img3@sha256:2222222222222222222222222222222222222222222222222222222222222222"),
            img("docker.io/library/old4:t"),
        ]);

        let diff = current.diff(&previous);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.updated.len(), 2);
        assert_eq!(diff.common.len(), 1);
    }

    #[test]
    fn set_is_iterable_and_has_length() {
        let set = ImageSet::new(vec![img("docker.io/library/alpine:3")]);
        assert_eq!(set.len(), 1);
        let mut count = 0;
        for _ in &set {
            count += 1;
        }
        assert_eq!(count, 1);
    }
}
