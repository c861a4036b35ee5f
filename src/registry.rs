use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::models::{InstanceKind, InstanceRecord, RegistrySelection};
use crate::storage::{Storage, API_LIST_KEY};
use crate::MirrorError;

/// Holds the current endpoint selection for each [`InstanceKind`] plus
/// the runtime lists of selectable options. Options are seeded with the
/// compiled-in defaults, appended to by the prober (first-seen URL
/// wins) and never removed.
///
/// The selection is persisted as a single JSON blob under
/// [`API_LIST_KEY`], and only while it differs from the defaults: a
/// selection equal to the defaults removes the blob entirely, keeping
/// persisted state minimal and compatible with future default changes.
#[derive(Debug)]
pub struct Registry {
    selection: RegistrySelection,
    options: HashMap<InstanceKind, Vec<InstanceRecord>>,
}

impl Registry {
    /// Load the registry from storage, falling back to compiled-in
    /// defaults for an absent or malformed blob and for missing keys.
    pub fn load(storage: &impl Storage) -> Self {
        let selection = match storage.get(API_LIST_KEY) {
            Some(blob) => match serde_json::from_str::<RegistrySelection>(&blob) {
                Ok(selection) => {
                    debug!("Loaded persisted instance selection");
                    selection
                }
                Err(e) => {
                    warn!(error = %e, "Malformed instance selection blob, using defaults");
                    RegistrySelection::default()
                }
            },
            None => RegistrySelection::default(),
        };

        let defaults = RegistrySelection::default();
        let mut options = HashMap::new();
        for kind in InstanceKind::ALL {
            let mut list = vec![defaults.get(kind).clone()];
            let selected = selection.get(kind);
            if !list.iter().any(|r| r.url == selected.url) {
                list.push(selected.clone());
            }
            options.insert(kind, list);
        }

        Self { selection, options }
    }

    pub fn selected(&self, kind: InstanceKind) -> &InstanceRecord {
        self.selection.get(kind)
    }

    pub fn selection(&self) -> &RegistrySelection {
        &self.selection
    }

    pub fn options(&self, kind: InstanceKind) -> &[InstanceRecord] {
        self.options.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Update the selection for `kind` and persist. Empty `name` or
    /// `url` is a silent no-op (`Ok(false)`), leaving prior state and
    /// the persisted blob intact.
    pub fn select(
        &mut self,
        storage: &impl Storage,
        kind: InstanceKind,
        name: &str,
        url: &str,
        custom: bool,
    ) -> Result<bool, MirrorError> {
        if name.is_empty() || url.is_empty() {
            debug!(kind = kind.as_str(), "Ignoring selection with empty name or url");
            return Ok(false);
        }

        *self.selection.get_mut(kind) = InstanceRecord {
            name: name.to_string(),
            url: url.to_string(),
            custom,
        };
        if custom {
            self.add_option(kind, self.selection.get(kind).clone());
        }
        info!(kind = kind.as_str(), name, url, custom, "Instance selected");

        self.persist(storage)?;
        Ok(true)
    }

    /// Mark the option with `url` as the in-memory selection for `kind`
    /// without touching persistence. Used when the fallback resolver
    /// reports which instance actually served playback. Returns false
    /// when no option with that URL exists.
    pub fn mark_served(&mut self, kind: InstanceKind, url: &str) -> bool {
        let Some(record) = self
            .options(kind)
            .iter()
            .find(|r| r.url == url)
            .cloned()
        else {
            return false;
        };
        debug!(kind = kind.as_str(), url, "Reflecting serving instance as selected");
        *self.selection.get_mut(kind) = record;
        true
    }

    /// Append a selectable option unless its URL is already present.
    /// Returns whether the option was added.
    pub fn add_option(&mut self, kind: InstanceKind, record: InstanceRecord) -> bool {
        let list = self.options.entry(kind).or_default();
        if list.iter().any(|r| r.url == record.url) {
            return false;
        }
        debug!(kind = kind.as_str(), name = %record.name, url = %record.url, "Added selectable option");
        list.push(record);
        true
    }

    /// Persist by diffing against defaults: store the serialized
    /// selection if any URL differs from its default, otherwise remove
    /// the blob.
    fn persist(&self, storage: &impl Storage) -> Result<(), MirrorError> {
        let defaults = RegistrySelection::default();
        let is_default = InstanceKind::ALL
            .iter()
            .all(|&kind| self.selection.get(kind).url == defaults.get(kind).url);

        if is_default {
            debug!("Selection matches defaults, removing persisted blob");
            storage.remove(API_LIST_KEY)
        } else {
            storage.set(API_LIST_KEY, &serde_json::to_string(&self.selection)?)
        }
    }
}
