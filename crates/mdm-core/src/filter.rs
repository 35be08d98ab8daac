//! Job list filtering: substring query, extension set, domain suffix.

use url::Url;

use crate::job::Job;

/// Filter over the job list. All present criteria are AND-ed together; an
/// empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Case-insensitive substring matched against title, url and file names.
    pub query: Option<String>,
    /// File extensions (with or without the leading dot).
    pub extensions: Option<Vec<String>>,
    /// Source domains; `example.com` also matches `sub.example.com`.
    pub domains: Option<Vec<String>>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(q) = normalized_query(self.query.as_deref()) {
            let title_hit = job
                .title
                .as_deref()
                .map(|t| t.to_lowercase().contains(&q))
                .unwrap_or(false);
            let url_hit = job.source_url.to_lowercase().contains(&q);
            let files_hit = job
                .result_files
                .as_deref()
                .map(|fs| fs.iter().any(|f| f.to_lowercase().contains(&q)))
                .unwrap_or(false);
            if !(title_hit || url_hit || files_hit) {
                return false;
            }
        }

        if let Some(exts) = &self.extensions {
            let wanted: Vec<String> = exts
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
            if !wanted.is_empty() {
                let mut job_exts: Vec<String> = Vec::new();
                if let Some(files) = &job.result_files {
                    job_exts.extend(files.iter().filter_map(|f| extension_of(f)));
                }
                job_exts.extend(extension_of(&job.source_url));
                if let Some(locator) = &job.local_locator {
                    job_exts.extend(extension_of(locator));
                }
                if !job_exts.iter().any(|e| wanted.contains(e)) {
                    return false;
                }
            }
        }

        if let Some(domains) = &self.domains {
            let wanted: Vec<String> = domains.iter().map(|d| normalize_host(d)).collect();
            if !wanted.is_empty() {
                let Some(host) = host_of(&job.source_url) else {
                    return false;
                };
                if !wanted
                    .iter()
                    .any(|d| host == *d || host.ends_with(&format!(".{d}")))
                {
                    return false;
                }
            }
        }

        true
    }
}

fn normalized_query(query: Option<&str>) -> Option<String> {
    let q = query?.trim().to_lowercase();
    if q.is_empty() {
        None
    } else {
        Some(q)
    }
}

fn host_of(source_url: &str) -> Option<String> {
    let parsed = Url::parse(source_url).ok()?;
    parsed.host_str().map(normalize_host)
}

fn normalize_host(host: &str) -> String {
    let mut h = host.trim().to_lowercase();
    if let Some(stripped) = h.strip_prefix("www.") {
        h = stripped.to_string();
    }
    // Tolerate "domain.com/path" style input.
    h.split('/').next().unwrap_or(&h).to_string()
}

/// Lowercased extension of the last path segment, if any.
fn extension_of(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next().unwrap_or(path);
    let dot = segment.rfind('.')?;
    if dot + 1 >= segment.len() {
        return None;
    }
    Some(segment[dot + 1..].to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;

    fn job() -> Job {
        Job::new(JobId::from("job_f"), "https://www.example.com/watch?v=1")
            .with_title("Holiday Mix")
            .with_completed(vec!["Holiday_Mix.mp4".into()], "/dl/Holiday_Mix.mp4")
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(JobFilter::default().matches(&job()));
    }

    #[test]
    fn query_matches_title_url_and_files() {
        let mut f = JobFilter {
            query: Some("holiday".into()),
            ..Default::default()
        };
        assert!(f.matches(&job()));
        f.query = Some("example.com".into());
        assert!(f.matches(&job()));
        f.query = Some("_mix.mp4".into());
        assert!(f.matches(&job()));
        f.query = Some("absent".into());
        assert!(!f.matches(&job()));
    }

    #[test]
    fn extension_filter_accepts_dotted_and_bare() {
        let f = JobFilter {
            extensions: Some(vec![".MP4".into()]),
            ..Default::default()
        };
        assert!(f.matches(&job()));
        let f = JobFilter {
            extensions: Some(vec!["mkv".into()]),
            ..Default::default()
        };
        assert!(!f.matches(&job()));
    }

    #[test]
    fn domain_filter_normalizes_www_and_matches_subdomains() {
        let f = JobFilter {
            domains: Some(vec!["Example.com".into()]),
            ..Default::default()
        };
        assert!(f.matches(&job()));

        let sub = Job::new(JobId::from("job_s"), "https://media.example.com/v/2");
        assert!(f.matches(&sub));

        let other = Job::new(JobId::from("job_o"), "https://example.org/v/3");
        assert!(!f.matches(&other));
    }

    #[test]
    fn criteria_are_anded() {
        let f = JobFilter {
            query: Some("holiday".into()),
            domains: Some(vec!["example.org".into()]),
            ..Default::default()
        };
        assert!(!f.matches(&job()));
    }

    #[test]
    fn unparseable_url_fails_domain_filter() {
        let f = JobFilter {
            domains: Some(vec!["example.com".into()]),
            ..Default::default()
        };
        let weird = Job::new(JobId::from("job_w"), "not a url");
        assert!(!f.matches(&weird));
    }
}
