use crate::metrics::{REGISTRY_ERRORS_TOTAL, REGISTRY_LOOKUPS_TOTAL};
use crate::models::{ImageReference, UpdateError, VersionSeries};
use oci_distribution::{Client as OciClient, Reference};
use std::collections::HashSet;
use tracing::{debug, info, warn};

mod auth;

pub use auth::{DockerAuth, extract_registry_from_image};

const PAGE_SIZE: usize = 1000;
const MAX_PAGES: usize = 100;

/// Finds the newest published build of an image by listing its registry tags.
pub struct TagResolver {
    client: OciClient,
    auth: DockerAuth,
}

impl TagResolver {
    pub fn new(auth: DockerAuth) -> Self {
        Self {
            client: OciClient::new(Default::default()),
            auth,
        }
    }

    /// Newest build of `image_name`, optionally restricted to one release series.
    pub async fn latest(
        &self,
        image_name: &str,
        series: Option<VersionSeries>,
    ) -> Result<ImageReference, UpdateError> {
        REGISTRY_LOOKUPS_TOTAL.inc();
        let tags = self.list_tags(image_name).await.inspect_err(|_| {
            REGISTRY_ERRORS_TOTAL.inc();
        })?;

        debug!("Found {} tags for {}", tags.len(), image_name);

        let latest = select_latest(image_name, &tags, series).ok_or_else(|| {
            UpdateError::Registry(match series {
                Some(series) => format!(
                    "no '<version>-r<revision>' tag of {} in series {}",
                    image_name, series
                ),
                None => format!("no '<version>-r<revision>' tag of {}", image_name),
            })
        })?;

        info!("Latest build of {} is {}", image_name, latest.tag());
        Ok(latest)
    }

    async fn list_tags(&self, image_name: &str) -> Result<Vec<String>, UpdateError> {
        let reference = Reference::try_from(image_name)
            .map_err(|e| UpdateError::Registry(format!("invalid image '{}': {}", image_name, e)))?;
        let auth = self.auth.auth_for_image(image_name);

        collect_pages(image_name, |last| {
            let (reference, auth) = (&reference, &auth);
            async move {
                self.client
                    .list_tags(reference, auth, Some(PAGE_SIZE), last.as_deref())
                    .await
                    .map(|page| page.tags)
                    .map_err(|e| {
                        UpdateError::Registry(format!(
                            "failed to list tags of {}: {}",
                            image_name, e
                        ))
                    })
            }
        })
        .await
    }
}

/// Follow `last`-based pagination until a page adds nothing new.
///
/// A short page does not end the listing, since registries may cap `n` below what was
/// asked for. Registries that ignore `last` keep returning the same page, which adds no
/// new tag and stops the loop.
async fn collect_pages<F, Fut>(image_name: &str, mut fetch: F) -> Result<Vec<String>, UpdateError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Vec<String>, UpdateError>>,
{
    let mut tags: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    for _ in 0..MAX_PAGES {
        let page = fetch(tags.last().cloned()).await?;
        let before = tags.len();
        for tag in page {
            if seen.insert(tag.clone()) {
                tags.push(tag);
            }
        }

        if tags.len() == before {
            return Ok(tags);
        }
    }

    warn!(
        "Stopped listing tags of {} after {} pages ({} tags)",
        image_name,
        MAX_PAGES,
        tags.len()
    );
    Ok(tags)
}

/// Highest `(version, revision)` among the tags that follow the tag grammar.
///
/// Tags that do not parse (`latest`, bare versions without a revision) are skipped. On a
/// tie the first tag listed wins.
pub fn select_latest(
    image_name: &str,
    tags: &[String],
    series: Option<VersionSeries>,
) -> Option<ImageReference> {
    tags.iter()
        .filter_map(|tag| ImageReference::from_parts(image_name, tag).ok())
        .filter(|reference| series.is_none_or(|s| s.contains(&reference.version)))
        .fold(None, |best: Option<ImageReference>, candidate| match best {
            Some(best) if candidate.compare_build(&best).is_le() => Some(best),
            _ => Some(candidate),
        })
}
