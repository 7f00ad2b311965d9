use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub const SCHEME: &str = "onesait-platform";

const ARTIFACTS: &str = "artifacts";

/// Decomposed `onesait-platform://<host>/<experiment_id>/<run_id>/artifacts[/<path>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactUri {
    pub host: String,
    pub experiment_id: String,
    pub run_id: String,
    pub path: Option<String>,
}

impl ArtifactUri {
    /// Root artifact locator of a run.
    pub fn new(host: &str, experiment_id: &str, run_id: &str) -> Self {
        ArtifactUri {
            host: host.to_string(),
            experiment_id: experiment_id.to_string(),
            run_id: run_id.to_string(),
            path: None,
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let malformed = || Error::MalformedUri(uri.to_string());

        let rest = uri
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(malformed)?;

        let mut parts = rest.splitn(5, '/');
        let host = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
        let experiment_id = parts
            .next()
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(malformed)?;
        let run_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
        if parts.next() != Some(ARTIFACTS) {
            return Err(malformed());
        }

        Ok(ArtifactUri {
            host: host.to_string(),
            experiment_id: experiment_id.to_string(),
            run_id: run_id.to_string(),
            path: parts.next().and_then(normalize),
        })
    }

    /// Locator for `path` below this one.
    pub fn join(&self, path: &str) -> Self {
        ArtifactUri {
            path: join_path(self.path.as_deref(), Some(path)),
            ..self.clone()
        }
    }
}

impl FromStr for ArtifactUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ArtifactUri::parse(s)
    }
}

impl fmt::Display for ArtifactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}/{}",
            SCHEME, self.host, self.experiment_id, self.run_id, ARTIFACTS
        )?;
        match &self.path {
            Some(p) => write!(f, "/{}", p),
            None => Ok(()),
        }
    }
}

// Strips surrounding slashes, an empty result means the artifact root
pub(crate) fn normalize(path: &str) -> Option<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn join_path(base: Option<&str>, path: Option<&str>) -> Option<String> {
    match (base.and_then(normalize), path.and_then(normalize)) {
        (Some(b), Some(p)) => Some(format!("{}/{}", b, p)),
        (b, None) => b,
        (None, p) => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_root() {
        let uri = ArtifactUri::parse("onesait-platform://lab.example.com/3/4f2a/artifacts").unwrap();
        assert_eq!(uri, ArtifactUri::new("lab.example.com", "3", "4f2a"));
    }

    #[test]
    fn parse_with_path() {
        let uri: ArtifactUri = "onesait-platform://host/12/run/artifacts/model/data/w.bin"
            .parse()
            .unwrap();
        assert_eq!(uri.host, "host");
        assert_eq!(uri.experiment_id, "12");
        assert_eq!(uri.run_id, "run");
        assert_eq!(uri.path.as_deref(), Some("model/data/w.bin"));
    }

    #[test]
    fn trailing_slash_is_root() {
        let uri = ArtifactUri::parse("onesait-platform://host/1/run/artifacts/").unwrap();
        assert_eq!(uri.path, None);
    }

    #[test]
    fn round_trip() {
        for s in [
            "onesait-platform://host:8443/0/abc/artifacts",
            "onesait-platform://h/007/r/artifacts/a",
            "onesait-platform://h/1/r/artifacts/a/b/c.txt",
        ] {
            let uri = ArtifactUri::parse(s).unwrap();
            assert_eq!(uri.to_string(), s);
            assert_eq!(ArtifactUri::parse(&uri.to_string()).unwrap(), uri);
        }
    }

    #[test]
    fn malformed() {
        for s in [
            "not-a-uri",
            "s3://host/1/run/artifacts",
            "onesait-platform:/host/1/run/artifacts",
            "onesait-platform://host/1/run",
            "onesait-platform://host/1/artifacts",
            "onesait-platform://host/exp/run/artifacts",
            "onesait-platform://host/1/run/artifactsx",
            "onesait-platform:///1/run/artifacts",
            "onesait-platform://host//run/artifacts",
        ] {
            match ArtifactUri::parse(s) {
                Err(Error::MalformedUri(u)) => assert_eq!(u, s),
                other => panic!("{} parsed as {:?}", s, other),
            }
        }
    }

    #[test]
    fn join() {
        let root = ArtifactUri::new("h", "1", "r");
        let sub = root.join("model/");
        assert_eq!(sub.to_string(), "onesait-platform://h/1/r/artifacts/model");
        assert_eq!(
            sub.join("w.bin").to_string(),
            "onesait-platform://h/1/r/artifacts/model/w.bin"
        );
        assert_eq!(root.join("").path, None);
    }
}
