// Manifest access
//
// The manifest is a key -> image reference document (usually YAML). Only the
// image references are touched: they are located and replaced textually so the
// rest of the document, comments included, stays byte-for-byte identical.

use crate::models::{ImageReference, ManifestError};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tag grammar: `<version>[-<suffix>]-r<revision>`, e.g. `2.0.0-debian-10-r5`.
pub const TAG_PATTERN: &str = r"[0-9]+(?:\.[0-9]+)*(?:-[A-Za-z0-9.]+)*?-r[0-9]+\b";

/// Characters that may not directly precede an image name, so that `app` does not
/// match inside `team/app` or `myapp`.
const NAME_BOUNDARY: &str = r"(^|[^A-Za-z0-9._/:-])";

const NAME_PATTERN: &str = r"[A-Za-z0-9][A-Za-z0-9._/:-]*?";

lazy_static! {
    static ref ANY_IMAGE: Regex = Regex::new(&format!(
        "{}({}):({})",
        NAME_BOUNDARY, NAME_PATTERN, TAG_PATTERN
    ))
    .unwrap();
}

pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tag currently pinned for `image_name`, or `None` when the image is not tracked.
    pub fn read_current_tag(&self, image_name: &str) -> Result<Option<String>, ManifestError> {
        let content = self.read()?;
        let pattern = image_pattern(image_name)?;

        let mut matches = pattern.captures_iter(&content);
        let Some(first) = matches.next() else {
            debug!(
                "Image {} not found in {}",
                image_name,
                self.path.display()
            );
            return Ok(None);
        };

        let tag = first[2].to_string();
        let others = matches.filter(|caps| caps[2] != *tag).count();
        if others > 0 {
            debug!(
                "Image {} is pinned to {} other tag(s) besides {}; using the first occurrence",
                image_name, others, tag
            );
        }

        Ok(Some(tag))
    }

    /// Parsed reference currently pinned for `image_name`.
    pub fn tracked_reference(
        &self,
        image_name: &str,
    ) -> Result<Option<ImageReference>, ManifestError> {
        match self.read_current_tag(image_name)? {
            Some(tag) => Ok(Some(ImageReference::from_parts(image_name, &tag)?)),
            None => Ok(None),
        }
    }

    /// Every image reference in the manifest that follows the tag grammar.
    pub fn tracked_images(&self) -> Result<Vec<ImageReference>, ManifestError> {
        let content = self.read()?;
        let mut images = Vec::new();
        for caps in ANY_IMAGE.captures_iter(&content) {
            let image = ImageReference::from_parts(&caps[2], &caps[3])?;
            if !images.contains(&image) {
                images.push(image);
            }
        }

        Ok(images)
    }

    /// Replace every `image_name:<tag>` occurrence with `new_full_name`.
    ///
    /// Returns the number of replaced references. The file is left untouched when the
    /// image is not tracked or when the result would no longer parse.
    pub fn write_tag(&self, image_name: &str, new_full_name: &str) -> Result<usize, ManifestError> {
        let content = self.read()?;
        let pattern = image_pattern(image_name)?;

        let count = pattern.captures_iter(&content).count();
        if count == 0 {
            return Err(ManifestError::NotTracked(image_name.to_string()));
        }

        let updated = pattern.replace_all(&content, |caps: &Captures| {
            format!("{}{}", &caps[1], new_full_name)
        });

        self.validate(&updated)?;
        self.write_atomic(&updated)?;

        info!(
            "Updated {} reference(s) of {} in {} to {}",
            count,
            image_name,
            self.path.display(),
            new_full_name
        );

        Ok(count)
    }

    /// Pin the manifest entry for `reference.name` to `reference`.
    pub fn set_component_image(&self, reference: &ImageReference) -> Result<usize, ManifestError> {
        self.write_tag(&reference.name, &reference.full_name())
    }

    fn read(&self) -> Result<String, ManifestError> {
        std::fs::read_to_string(&self.path).map_err(|source| ManifestError::Read {
            path: self.path.clone(),
            source,
        })
    }

    fn validate(&self, content: &str) -> Result<(), ManifestError> {
        let structured = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "yaml" | "yml" | "json"));

        if !structured {
            return Ok(());
        }

        serde_yaml::from_str::<serde_yaml::Value>(content)
            .map(|_| ())
            .map_err(|e| ManifestError::Invalid {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    fn write_atomic(&self, content: &str) -> Result<(), ManifestError> {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "manifest".to_string());
        let temp_path = self.path.with_file_name(format!(".{}.crosswind.tmp", file_name));

        let to_write_error = |source| ManifestError::Write {
            path: self.path.clone(),
            source,
        };

        std::fs::write(&temp_path, content).map_err(to_write_error)?;
        std::fs::rename(&temp_path, &self.path).map_err(|source| {
            let _ = std::fs::remove_file(&temp_path);
            to_write_error(source)
        })
    }
}

fn image_pattern(image_name: &str) -> Result<Regex, ManifestError> {
    Regex::new(&format!(
        "{}{}:({})",
        NAME_BOUNDARY,
        regex::escape(image_name),
        TAG_PATTERN
    ))
    .map_err(|e| ManifestError::Pattern {
        image: image_name.to_string(),
        reason: e.to_string(),
    })
}
