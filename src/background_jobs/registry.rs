use super::job::{ErasedJob, Job, JobArgs, JobError, TypedJob};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Payload used when a ledger row stored no arguments.
const EMPTY_ARGUMENTS: &str = "{}";

type JobConstructor = Arc<dyn Fn() -> Box<dyn ErasedJob> + Send + Sync>;
type ArgsDecoder = fn(&str) -> Result<Arc<JobArgs>, JobError>;

fn decode_typed<J: Job>(serialized: &str) -> Result<Arc<JobArgs>, JobError> {
    let args: J::Args = serde_json::from_str(serialized)?;
    Ok(Arc::new(args))
}

/// Everything needed to rebuild one job variant from its stored names.
#[derive(Clone)]
pub struct RegisteredJob {
    pub type_name: &'static str,
    pub args_type_name: &'static str,
    pub description: &'static str,
    constructor: JobConstructor,
    decode: ArgsDecoder,
}

impl RegisteredJob {
    pub fn instantiate(&self) -> Box<dyn ErasedJob> {
        (self.constructor)()
    }

    /// Decodes stored arguments, checking they were written for this job.
    pub fn decode_args(
        &self,
        arguments_type_name: Option<&str>,
        serialized: Option<&str>,
    ) -> Result<Arc<JobArgs>, JobError> {
        if let Some(stored) = arguments_type_name {
            if stored != self.args_type_name {
                return Err(JobError::ArgumentMismatch(format!(
                    "job {} expects arguments {}, ledger holds {}",
                    self.type_name, self.args_type_name, stored
                )));
            }
        }
        (self.decode)(serialized.unwrap_or(EMPTY_ARGUMENTS))
    }
}

/// Closed set of job variants known to this process.
///
/// Only names registered here can ever be constructed from ledger data.
#[derive(Default, Clone)]
pub struct JobRegistry {
    jobs: HashMap<&'static str, RegisteredJob>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `J`, built by `factory` for every execution.
    pub fn register<J, F>(&mut self, factory: F)
    where
        J: Job,
        F: Fn() -> J + Send + Sync + 'static,
    {
        let sample = factory();
        let entry = RegisteredJob {
            type_name: J::TYPE_NAME,
            args_type_name: J::ARGS_TYPE_NAME,
            description: sample.description(),
            constructor: Arc::new(move || Box::new(TypedJob::new(factory())) as Box<dyn ErasedJob>),
            decode: decode_typed::<J>,
        };
        if self.jobs.insert(J::TYPE_NAME, entry).is_some() {
            warn!("Job type {} registered twice, keeping the latest", J::TYPE_NAME);
        }
    }

    pub fn resolve(&self, type_name: &str) -> Option<&RegisteredJob> {
        self.jobs.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.jobs.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.jobs.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
