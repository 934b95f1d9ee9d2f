use crate::error::{Error, Result};
use std::fmt;

/// A GitHub repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    /// Parse `owner/name`. Anything else (a bare name, extra path segments,
    /// something that looks like a CLI flag) is rejected.
    pub fn parse(repo: &str) -> Result<Self> {
        let repo = repo.trim();
        if repo.is_empty() {
            return Err(Error::Parse(
                "repository identifier cannot be empty".to_string(),
            ));
        }

        if repo.starts_with('-') {
            return Err(Error::Parse(format!(
                "invalid repository '{}'. It looks like a CLI flag.",
                repo
            )));
        }

        let parts: Vec<&str> = repo.split('/').collect();
        match parts.as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(RepoId {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(Error::Parse(format!(
                "invalid repository format: {}. Should be owner/repo",
                repo
            ))),
        }
    }

    pub fn full_repo(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Lowercased repository name, used when matching asset file names.
    pub fn short_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Flat file-system friendly key (`owner_name`).
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
