use crate::config::Config;
use crate::generator::RenderOptions;
use crate::pipeline::{NewsletterPipeline, PipelineStage, RunReport};
use crate::profile::ProfileStore;
use crate::types::{Result, UserProfile};
use crate::workflow::{Trigger, Workflow};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

pub struct AppState {
    pub config: Config,
    pub store: ProfileStore,
    pub pipeline: NewsletterPipeline,
    pub session: RwLock<Session>,
}

impl AppState {
    pub fn new(config: Config, pipeline: NewsletterPipeline) -> Self {
        let store = ProfileStore::new(config.newsletter.profiles_dir.clone());
        Self {
            config,
            store,
            pipeline,
            session: RwLock::new(Session::default()),
        }
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let pipeline = NewsletterPipeline::from_config(&config)?;
        Ok(Self::new(config, pipeline))
    }
}

/// The single interactive session served by the GUI.
#[derive(Default)]
pub struct Session {
    pub workflow: Option<Workflow>,
    /// Profile the interests were taken from, if one was loaded.
    pub profile: Option<UserProfile>,
    pub task: Option<JoinHandle<()>>,
    pub progress: Option<watch::Receiver<PipelineStage>>,
    pub last_report: Option<RunReport>,
    /// Render options of the run that produced `last_report`.
    pub run_options: Option<RenderOptions>,
}

impl Session {
    /// Profile for the next run: the loaded one with the session's
    /// interests, or an anonymous one.
    pub fn run_profile(&self) -> UserProfile {
        let interests = self
            .workflow
            .as_ref()
            .map(|workflow| workflow.interests().to_vec())
            .unwrap_or_default();
        match &self.profile {
            Some(profile) => {
                let mut profile = profile.clone();
                profile.interests = interests;
                profile
            }
            None => UserProfile::new("web", interests),
        }
    }

    /// Record the outcome of a generation task. Results of a run that was
    /// cancelled or replaced are dropped.
    pub fn finish(&mut self, run_id: Uuid, result: Result<RunReport>) {
        let Some(workflow) = self.workflow.as_mut() else {
            return;
        };

        let trigger = match &result {
            Ok(_) => Trigger::GenerationSucceeded { run_id },
            Err(e) => Trigger::GenerationFailed { run_id, reason: e.to_string() },
        };

        match workflow.apply(trigger) {
            Ok(state) => {
                info!("Generation {} finished: {}", run_id, state);
                if let Ok(report) = result {
                    self.last_report = Some(report);
                }
                self.task = None;
            }
            Err(e) => warn!("Ignoring generation result: {}", e),
        }
    }
}
