use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError, MAX_CAS_ATTEMPTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Open,
    Wip,
    Closed,
}

/// One deduplicated, recurring logical error. Exactly one row exists per
/// (project, fingerprint); `count` equals the number of events ever
/// attributed to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub project: String,
    pub fingerprint: String,
    pub kind: String,
    pub origin: String,
    pub call_path: String,
    pub last_message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub count: u64,
    pub status: IssueStatus,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Attributes captured from the occurrence that creates or touches an issue.
#[derive(Debug, Clone)]
pub struct OccurrenceAttrs {
    pub kind: String,
    pub origin: String,
    pub call_path: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl Store {
    /// Insert-or-increment for one fingerprint, safe under concurrent callers.
    ///
    /// The whole update goes through compare-and-swap against the witnessed
    /// bytes: the first writer creates the issue with `count = 1`, every
    /// other writer increments the stored counter. A lost race re-reads and
    /// retries, so N concurrent calls always land a final count of N. The
    /// `created` flag is returned explicitly so callers never re-derive
    /// "new issue" from the counter.
    pub fn find_or_increment_issue(
        &self,
        project: &str,
        fingerprint: &str,
        attrs: &OccurrenceAttrs,
    ) -> Result<(Issue, bool), StoreError> {
        let key = keys::issue_key(project, fingerprint);

        for _ in 0..MAX_CAS_ATTEMPTS {
            match self.issues.get(key.as_bytes())? {
                None => {
                    let issue = Issue {
                        project: project.to_string(),
                        fingerprint: fingerprint.to_string(),
                        kind: attrs.kind.clone(),
                        origin: attrs.origin.clone(),
                        call_path: attrs.call_path.clone(),
                        last_message: attrs.message.clone(),
                        first_seen: attrs.occurred_at,
                        last_seen: attrs.occurred_at,
                        count: 1,
                        status: IssueStatus::Open,
                        closed_at: None,
                    };
                    let bytes = Self::serialize(&issue)?;
                    if self
                        .issues
                        .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(bytes))?
                        .is_ok()
                    {
                        return Ok((issue, true));
                    }
                    // Another writer created it first; fall through to increment.
                }
                Some(old_raw) => {
                    let mut issue: Issue = Self::deserialize(&old_raw)?;
                    issue.count += 1;
                    if attrs.occurred_at > issue.last_seen {
                        issue.last_seen = attrs.occurred_at;
                    }
                    issue.last_message = attrs.message.clone();
                    let new_bytes = Self::serialize(&issue)?;
                    if self
                        .issues
                        .compare_and_swap(
                            key.as_bytes(),
                            Some(old_raw.as_ref()),
                            Some(new_bytes),
                        )?
                        .is_ok()
                    {
                        return Ok((issue, false));
                    }
                }
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "issue".to_string(),
            key,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    pub fn get_issue(
        &self,
        project: &str,
        fingerprint: &str,
    ) -> Result<Option<Issue>, StoreError> {
        let key = keys::issue_key(project, fingerprint);
        match self.issues.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Explicit lifecycle transition; never triggered implicitly by counting.
    pub fn set_issue_status(
        &self,
        project: &str,
        fingerprint: &str,
        status: IssueStatus,
    ) -> Result<Issue, StoreError> {
        let key = keys::issue_key(project, fingerprint);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let old_raw = self.issues.get(key.as_bytes())?.ok_or_else(|| {
                StoreError::NotFound {
                    entity: "issue".to_string(),
                    key: key.clone(),
                }
            })?;
            let mut issue: Issue = Self::deserialize(&old_raw)?;
            issue.status = status;
            issue.closed_at = match status {
                IssueStatus::Closed => Some(Utc::now()),
                _ => None,
            };
            let new_bytes = Self::serialize(&issue)?;
            if self
                .issues
                .compare_and_swap(key.as_bytes(), Some(old_raw.as_ref()), Some(new_bytes))?
                .is_ok()
            {
                return Ok(issue);
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "issue".to_string(),
            key,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Issues for a project, most recently seen first.
    pub fn list_issues(
        &self,
        project: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Issue>, StoreError> {
        let prefix = keys::issue_prefix(project);
        let mut issues = Vec::new();
        for item in self.issues.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            issues.push(Self::deserialize::<Issue>(&value)?);
        }
        issues.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(issues.into_iter().skip(offset).take(limit).collect())
    }

    pub fn count_issues(&self, project: &str) -> Result<usize, StoreError> {
        let prefix = keys::issue_prefix(project);
        let mut count = 0usize;
        for item in self.issues.scan_prefix(prefix.as_bytes()) {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }
}
