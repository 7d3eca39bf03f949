use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::model::source::SourceUser;
use crate::model::target::TargetUser;
use crate::providers::TargetView;

/// Static source-user to target-login table.
#[derive(Debug, Clone)]
pub struct UserBridge {
    by_source: HashMap<String, String>,
}

#[derive(Deserialize)]
struct MappingDocument {
    mapping: Pairs,
}

/// Object entries in document order, duplicates included.
struct Pairs(Vec<(String, String)>);

impl<'de> Deserialize<'de> for Pairs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Pairs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of string to string pairs")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Pairs, A::Error> {
                let mut pairs = Vec::new();
                while let Some((k, v)) = map.next_entry::<String, String>()? {
                    pairs.push((k, v));
                }
                Ok(Pairs(pairs))
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}

impl UserBridge {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!("failed to read bridge mapping {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let doc: MappingDocument = serde_json::from_str(contents)
            .map_err(|e| SyncError::config(format!("invalid bridge mapping: {e}")))?;
        Self::from_pairs(doc.mapping.0)
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self> {
        let mut by_source = HashMap::with_capacity(pairs.len());
        let mut targets = HashSet::with_capacity(pairs.len());

        for (source, target) in pairs {
            let (source, target) = (source.trim().to_string(), target.trim().to_string());
            if source.is_empty() || target.is_empty() {
                return Err(SyncError::config("bridge mapping entries must not be empty"));
            }
            if !targets.insert(target.clone()) {
                return Err(SyncError::config(format!(
                    "target user '{target}' is mapped more than once"
                )));
            }
            if by_source.insert(source.clone(), target).is_some() {
                return Err(SyncError::config(format!(
                    "source user '{source}' is mapped more than once"
                )));
            }
        }

        debug!(entries = by_source.len(), "loaded bridge mapping");
        Ok(Self { by_source })
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Target login for a source user, matched on account id first, then email.
    pub fn target_login(&self, user: &SourceUser) -> Option<&str> {
        self.by_source
            .get(&user.id)
            .or_else(|| user.email.as_ref().and_then(|e| self.by_source.get(e)))
            .map(String::as_str)
    }

    /// Resolve the live target account for a source user.
    ///
    /// `Ok(None)` means the user is not in the table. A mapped login that the
    /// target does not know is an error: the table is wrong.
    pub async fn map(
        &self,
        target: &dyn TargetView,
        user: &SourceUser,
    ) -> Result<Option<TargetUser>> {
        let Some(login) = self.target_login(user) else {
            return Ok(None);
        };
        match target.get_user(login).await? {
            Some(found) => Ok(Some(found)),
            None => Err(SyncError::not_found("target user", login)),
        }
    }
}
