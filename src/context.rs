//! Process-wide shared state
//!
//! One `AppContext` is built at startup and threaded through the
//! pipeline as a handle, so tests can substitute fresh instances of
//! the caches instead of relying on globals.

use crate::config::AppConfig;
use crate::crawl::blocklist::Blocklist;
use crate::dispatch::Dispatchers;
use crate::error::PipelineResult;
use crate::gatekeeper::Gatekeeper;
use crate::robots::RobotsEvaluator;
use crate::scrape::engines::ValidatorCache;

pub struct AppContext {
    pub config: AppConfig,
    pub dispatchers: Dispatchers,
    pub validator_cache: ValidatorCache,
    pub gatekeeper: Gatekeeper,
    pub blocklist: Blocklist,
    pub robots: RobotsEvaluator,
}

impl AppContext {
    pub fn new(config: AppConfig) -> PipelineResult<Self> {
        let dispatchers = Dispatchers::new(&config)?;
        let gatekeeper = Gatekeeper::new(&config);
        let blocklist = Blocklist::new(&config.blocklist_allowed_domains);
        Ok(Self {
            config,
            dispatchers,
            validator_cache: ValidatorCache::new(),
            gatekeeper,
            blocklist,
            robots: RobotsEvaluator::new(),
        })
    }
}
