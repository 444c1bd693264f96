//! The process's central command: the hot-swappable [`Config`]/[`Keytab`]
//! pair, the Role Store, metrics, the logger, and the replay cache.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::config::Config;
use crate::error::CoreError;
use crate::keytab::Keytab;
use crate::kerberos::ReplayCache;
use crate::log::Logger;
use crate::metrics::MetricsCollection;
use crate::store::RoleStore;

/// The live `Config` plus the `Keytab` decoded from it, swapped together
/// so a reader never observes a `Config` whose keytab hasn't been
/// decoded yet.
#[derive(Clone)]
pub struct Loaded {
    pub config: Config,
    pub keytab: Arc<Keytab>,
}

/// The process's central command.
pub struct Center {
    /// The current `Config`/`Keytab` pair, or `None` before the first
    /// write to `/v1/config`.
    pub loaded: ArcSwap<Option<Loaded>>,

    /// The Role Store.
    pub roles: RoleStore,

    /// Login/PAC/rotation counters.
    pub metrics: MetricsCollection,

    /// The logger.
    pub logger: &'static Logger,

    /// The replay cache: the sole shared-mutable-state exception on the
    /// validation hot path.
    pub replay_cache: ReplayCache,
}

impl Center {
    pub fn new(roles: RoleStore, logger: &'static Logger) -> Self {
        Self {
            loaded: ArcSwap::from_pointee(None),
            roles,
            metrics: MetricsCollection::new(),
            logger,
            replay_cache: ReplayCache::new(),
        }
    }

    /// Reconstruct `loaded` from whatever `Config` the Role Store holds,
    /// if any. Called at process startup once state has been opened.
    pub fn reload_from_store(&self) -> Result<(), CoreError> {
        match self.roles.get_config()? {
            Some(config) => {
                let keytab = config.validate()?;
                self.loaded.store(Arc::new(Some(Loaded { config, keytab: Arc::new(keytab) })));
            }
            None => self.loaded.store(Arc::new(None)),
        }
        Ok(())
    }

    /// Persist and hot-swap a new `Config` (the `/v1/config` write path).
    /// Validation happens twice deliberately: once inside `put_config`
    /// (so a bad write never reaches storage) and once here to build the
    /// `Keytab` that gets swapped in.
    pub fn set_config(&self, config: Config) -> Result<(), CoreError> {
        self.roles.put_config(&config)?;
        let keytab = config.validate()?;
        self.loaded.store(Arc::new(Some(Loaded { config, keytab: Arc::new(keytab) })));
        Ok(())
    }

    pub fn clear_config(&self) -> Result<(), CoreError> {
        self.roles.delete_config()?;
        self.loaded.store(Arc::new(None));
        Ok(())
    }

    pub fn current(&self) -> Option<Loaded> {
        self.loaded.load().as_ref().clone()
    }

    /// Rotate the service keytab in place: decode and validate a new
    /// keytab against the current realm/SPN, then swap it in. The prior
    /// `Config` (and its keytab) stays live if anything here fails.
    pub fn rotate_keytab(&self, new_keytab_bytes: &[u8]) -> Result<(), CoreError> {
        let current = self
            .current()
            .ok_or_else(|| CoreError::not_configured("no configuration is loaded"))?;

        let mut next_config = current.config.clone();
        next_config.keytab_bytes = base64_encode(new_keytab_bytes);
        let next_keytab = next_config.validate()?;

        self.roles.put_config(&next_config)?;
        self.loaded.store(Arc::new(Some(Loaded { config: next_config, keytab: Arc::new(next_keytab) })));
        self.metrics.counters().record_rotation();
        info!("Rotated service keytab");
        Ok(())
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
