use crate::version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("Image reference '{0}' has no tag")]
    MissingTag(String),
    #[error("Image reference '{0}' has an empty name")]
    EmptyName(String),
    #[error("Tag '{0}' has no '-r<revision>' suffix")]
    MissingRevision(String),
    #[error("Tag '{0}' does not start with a numeric version")]
    InvalidVersion(String),
    #[error("Tag '{0}' has a suffix outside [A-Za-z0-9.] or an empty '-' segment")]
    InvalidSuffix(String),
}

/// Ordered `(major, minor, patch)` triple.
///
/// Ordering is lexicographic by component, which the derive gives us for free
/// because of the field order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SemVerTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVerTriple {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn series(&self) -> VersionSeries {
        VersionSeries {
            major: self.major,
            minor: self.minor,
        }
    }
}

impl FromStr for SemVerTriple {
    type Err = ReferenceError;

    /// Accepts `1`, `1.2`, `1.2.3` and longer dotted forms; missing components are zero and
    /// anything past the patch level is ignored. Every present component must be numeric.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parsed = [0u64; 3];
        for (index, part) in s.split('.').enumerate() {
            let value: u64 = part
                .parse()
                .map_err(|_| ReferenceError::InvalidVersion(s.to_string()))?;
            if index < parsed.len() {
                parsed[index] = value;
            }
        }

        Ok(Self::new(parsed[0], parsed[1], parsed[2]))
    }
}

impl fmt::Display for SemVerTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The `(major, minor)` release line of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionSeries {
    pub major: u64,
    pub minor: u64,
}

impl VersionSeries {
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Series encoded in a release branch name such as `release-1.9`.
    pub fn from_release_branch(branch: &str) -> Option<Self> {
        let rest = branch.strip_prefix(RELEASE_BRANCH_PREFIX)?;
        let (major, minor) = rest.split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    pub fn contains(&self, version: &SemVerTriple) -> bool {
        version.series() == *self
    }
}

impl fmt::Display for VersionSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

pub const RELEASE_BRANCH_PREFIX: &str = "release-";

/// A container image pinned to a tag of the form `<version>[-<suffix>]-r<revision>`,
/// e.g. `bitnami/redis:7.0.5-debian-11-r3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub name: String,
    pub version: SemVerTriple,
    pub revision: u64,
    pub tag_suffix: Option<String>,
    /// Version exactly as written in the tag, so `2.0` is not rewritten as `2.0.0`.
    version_text: String,
}

impl ImageReference {
    /// Build a reference from an image name and a tag following the tag grammar.
    pub fn from_parts(name: &str, tag: &str) -> Result<Self, ReferenceError> {
        if name.is_empty() {
            return Err(ReferenceError::EmptyName(format!("{}:{}", name, tag)));
        }

        let (head, revision) = tag
            .rsplit_once("-r")
            .ok_or_else(|| ReferenceError::MissingRevision(tag.to_string()))?;
        if !is_numeric(revision) {
            return Err(ReferenceError::MissingRevision(tag.to_string()));
        }
        let revision: u64 = revision
            .parse()
            .map_err(|_| ReferenceError::MissingRevision(tag.to_string()))?;

        let (version_text, tag_suffix) = match head.split_once('-') {
            Some((version, suffix)) => (version, Some(suffix)),
            None => (head, None),
        };

        if !version_text.split('.').all(is_numeric) {
            return Err(ReferenceError::InvalidVersion(tag.to_string()));
        }

        // Same character set the manifest scanner accepts, so a written tag can be read back
        if let Some(suffix) = tag_suffix
            && !suffix.split('-').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '.')
            })
        {
            return Err(ReferenceError::InvalidSuffix(tag.to_string()));
        }

        let version = version_text
            .parse()
            .map_err(|_| ReferenceError::InvalidVersion(tag.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            version,
            revision,
            tag_suffix: tag_suffix.map(str::to_string),
            version_text: version_text.to_string(),
        })
    }

    pub fn version_text(&self) -> &str {
        &self.version_text
    }

    pub fn tag(&self) -> String {
        match &self.tag_suffix {
            Some(suffix) => format!("{}-{}-r{}", self.version_text, suffix, self.revision),
            None => format!("{}-r{}", self.version_text, self.revision),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}:{}", self.name, self.tag())
    }

    /// Last path segment of the image name, used as the default component name.
    pub fn component_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Compare versions with the four-component comparator, ignoring revisions.
    pub fn compare_version(&self, other: &Self) -> Ordering {
        version::compare(&self.version_text, &other.version_text)
    }

    /// Compare by version first, then by revision.
    pub fn compare_build(&self, other: &Self) -> Ordering {
        self.compare_version(other)
            .then(self.revision.cmp(&other.revision))
    }
}

impl FromStr for ImageReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match split_image(s) {
            (name, Some(tag)) => Self::from_parts(name, tag),
            (_, None) => Err(ReferenceError::MissingTag(s.to_string())),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

fn is_numeric(part: &str) -> bool {
    !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())
}

/// Split an image into its name and optional tag.
/// Examples:
///   "bitnami/redis:7.0.5-r1" -> ("bitnami/redis", Some("7.0.5-r1"))
///   "localhost:5000/redis" -> ("localhost:5000/redis", None)
pub fn split_image(image: &str) -> (&str, Option<&str>) {
    match image.rsplit_once(':') {
        // A ':' followed by a path is a registry port, not a tag
        Some((_, tag)) if tag.contains('/') => (image, None),
        Some((name, tag)) => (name, Some(tag)),
        None => (image, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_debian_tag() {
        let image: ImageReference = "bitnami/redis:2.0.0-debian-10-r5".parse().unwrap();
        assert_eq!(image.name, "bitnami/redis");
        assert_eq!(image.version, SemVerTriple::new(2, 0, 0));
        assert_eq!(image.revision, 5);
        assert_eq!(image.tag_suffix.as_deref(), Some("debian-10"));
        assert_eq!(image.tag(), "2.0.0-debian-10-r5");
        assert_eq!(image.full_name(), "bitnami/redis:2.0.0-debian-10-r5");
    }

    #[test]
    fn test_parse_tag_without_suffix() {
        let image: ImageReference = "app:1.4-r12".parse().unwrap();
        assert_eq!(image.version, SemVerTriple::new(1, 4, 0));
        assert_eq!(image.version_text(), "1.4");
        assert_eq!(image.revision, 12);
        assert!(image.tag_suffix.is_none());
        // Short versions are written back unchanged
        assert_eq!(image.tag(), "1.4-r12");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let image: ImageReference = "localhost:5000/team/app:3.1.2-r0".parse().unwrap();
        assert_eq!(image.name, "localhost:5000/team/app");
        assert_eq!(image.component_name(), "app");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "bitnami/redis".parse::<ImageReference>(),
            Err(ReferenceError::MissingTag("bitnami/redis".to_string()))
        );
        assert!(matches!(
            "redis:7.0.5".parse::<ImageReference>(),
            Err(ReferenceError::MissingRevision(_))
        ));
        assert!(matches!(
            "redis:latest-r1".parse::<ImageReference>(),
            Err(ReferenceError::InvalidVersion(_))
        ));
        assert!(matches!(
            "redis:7.0.5-debian_11-r1".parse::<ImageReference>(),
            Err(ReferenceError::InvalidSuffix(_))
        ));
        assert!(matches!(
            "redis:7.0.5--r1".parse::<ImageReference>(),
            Err(ReferenceError::InvalidSuffix(_))
        ));
        assert!(matches!(
            "redis:7.0.5-r+1".parse::<ImageReference>(),
            Err(ReferenceError::MissingRevision(_))
        ));
        assert!(matches!(
            ":1.0.0-r1".parse::<ImageReference>(),
            Err(ReferenceError::EmptyName(_))
        ));
    }

    #[test]
    fn test_series() {
        let version = SemVerTriple::new(1, 9, 5);
        assert_eq!(version.series(), VersionSeries::new(1, 9));
        assert!(VersionSeries::new(1, 9).contains(&version));
        assert!(!VersionSeries::new(2, 0).contains(&version));
    }

    #[test]
    fn test_release_branch_series() {
        assert_eq!(
            VersionSeries::from_release_branch("release-1.9"),
            Some(VersionSeries::new(1, 9))
        );
        assert_eq!(VersionSeries::from_release_branch("main"), None);
        assert_eq!(VersionSeries::from_release_branch("release-next"), None);
        assert_eq!(VersionSeries::from_release_branch("release-1"), None);
    }

    #[test]
    fn test_compare_build() {
        let older: ImageReference = "app:1.2.3-r4".parse().unwrap();
        let rebuilt: ImageReference = "app:1.2.3-r5".parse().unwrap();
        let newer: ImageReference = "app:1.2.10-r0".parse().unwrap();

        assert_eq!(older.compare_build(&rebuilt), Ordering::Less);
        assert_eq!(newer.compare_build(&rebuilt), Ordering::Greater);
        assert_eq!(older.compare_version(&rebuilt), Ordering::Equal);
    }
}
