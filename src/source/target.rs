//! Map a pull/merge request page URL to the patch that backs it.

use reqwest::Url;

use crate::models::{Provider, ReviewError, ReviewTarget};

const GITHUB_HOST: &str = "github.com";
const GITLAB_HOST: &str = "gitlab.com";
const GITHUB_PATCH_BASE: &str = "https://patch-diff.githubusercontent.com/raw";
const MR_MARKER: &str = "-/merge_requests";

/// Shown for hosts other than GitHub and GitLab.
pub const UNSUPPORTED_HOST_MESSAGE: &str = "Only github.com or gitlab.com are supported.";

fn not_a_change_page(provider: Provider) -> ReviewError {
    ReviewError::UnsupportedTarget(format!(
        "Please open a specific Pull Request or Merge Request on {provider}"
    ))
}

/// Resolve `page_url` into a review target.
///
/// `gitlab_hosts` lists self-hosted GitLab instances in addition to
/// gitlab.com. Makes no network calls.
pub fn resolve_target(page_url: &str, gitlab_hosts: &[String]) -> Result<ReviewTarget, ReviewError> {
    let url = Url::parse(page_url.trim())
        .map_err(|_| ReviewError::UnsupportedTarget(UNSUPPORTED_HOST_MESSAGE.to_string()))?;
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if host == GITHUB_HOST {
        return github_target(page_url, &segments);
    }
    if host == GITLAB_HOST || gitlab_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
        return gitlab_target(&url, page_url, &segments);
    }
    Err(ReviewError::UnsupportedTarget(
        UNSUPPORTED_HOST_MESSAGE.to_string(),
    ))
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `/<owner>/<repo>/pull/<n>[/...]`
fn github_target(page_url: &str, segments: &[&str]) -> Result<ReviewTarget, ReviewError> {
    match segments {
        [owner, repo, "pull", number, ..] if is_number(number) => Ok(ReviewTarget {
            provider: Provider::GitHub,
            page_url: page_url.to_string(),
            patch_url: format!("{GITHUB_PATCH_BASE}/{owner}/{repo}/pull/{number}.patch"),
            display_name: format!("{owner}/{repo}#{number}"),
        }),
        _ => Err(not_a_change_page(Provider::GitHub)),
    }
}

/// `/<project path...>/-/merge_requests/<n>[/...]`
fn gitlab_target(url: &Url, page_url: &str, segments: &[&str]) -> Result<ReviewTarget, ReviewError> {
    let marker = segments
        .windows(2)
        .position(|w| w[0] == "-" && w[1] == "merge_requests")
        .ok_or_else(|| not_a_change_page(Provider::GitLab))?;
    let project = &segments[..marker];
    let number = segments
        .get(marker + 2)
        .copied()
        .filter(|n| is_number(n))
        .ok_or_else(|| not_a_change_page(Provider::GitLab))?;
    if project.is_empty() {
        return Err(not_a_change_page(Provider::GitLab));
    }

    let project = project.join("/");
    let origin = match url.port() {
        Some(port) => format!("{}://{}:{port}", url.scheme(), url.host_str().unwrap_or_default()),
        None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
    };
    Ok(ReviewTarget {
        provider: Provider::GitLab,
        page_url: page_url.to_string(),
        patch_url: format!("{origin}/{project}/{MR_MARKER}/{number}.patch"),
        display_name: format!("{project}!{number}"),
    })
}
