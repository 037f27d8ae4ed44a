//! Registry of job descriptions, handlers and job types.
//!
//! A [`JobRegistry`] is an explicit, cheaply cloneable handle; every scheduler
//! built on the same handle sees the same jobs. The registry is append-only:
//! nothing is ever unregistered, which lets resolution results (compiled
//! validator chains plus the strategy-wrapped handler) be cached forever.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use super::handler::{JobHandler, SharedHandler};
use super::strategy::{JobStrategy, JobStrategyKind};
use super::{JobDescription, JobError, JobName};
use crate::schema::{BasicSchemaCompiler, SchemaCompiler, SchemaValidator};

/// Optional settings for [`JobRegistry::register`].
#[derive(Default)]
pub struct RegisterOptions {
    input: Option<Value>,
    output: Option<Value>,
    channels: BTreeMap<String, Value>,
    input_channel: Option<Value>,
    extends: Option<JobName>,
    job_type: Option<String>,
    default_for_type: bool,
    strategy: Option<Arc<dyn JobStrategy>>,
}

impl fmt::Debug for RegisterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterOptions")
            .field("extends", &self.extends)
            .field("job_type", &self.job_type)
            .field("default_for_type", &self.default_for_type)
            .field("strategy", &self.strategy.as_ref().map(|s| s.kind()))
            .finish_non_exhaustive()
    }
}

impl RegisterOptions {
    /// Options accepting any input and output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Input schema.
    #[must_use]
    pub fn with_input(mut self, schema: Value) -> Self {
        self.input = Some(schema);
        self
    }

    /// Output schema.
    #[must_use]
    pub fn with_output(mut self, schema: Value) -> Self {
        self.output = Some(schema);
        self
    }

    /// Declare an output channel. The schema documents the channel's values
    /// and must compile, but messages are not validated against it.
    #[must_use]
    pub fn with_channel(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.channels.insert(name.into(), schema);
        self
    }

    /// Schema of the default input channel.
    #[must_use]
    pub fn with_input_channel(mut self, schema: Value) -> Self {
        self.input_channel = Some(schema);
        self
    }

    /// Validate input and output against `parent`'s schemas first.
    #[must_use]
    pub fn extending(mut self, parent: impl Into<JobName>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Declare the job as belonging to `job_type`.
    #[must_use]
    pub fn of_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    /// Make the job the default of its type.
    #[must_use]
    pub const fn as_default_for_type(mut self) -> Self {
        self.default_for_type = true;
        self
    }

    /// Use a fresh strategy instance of `kind`.
    #[must_use]
    pub fn with_strategy(mut self, kind: JobStrategyKind) -> Self {
        self.strategy = Some(kind.instantiate());
        self
    }

    /// Use a strategy instance that may be shared with other jobs.
    #[must_use]
    pub fn with_shared_strategy(mut self, strategy: Arc<dyn JobStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

struct RegisteredJob {
    description: Arc<JobDescription>,
    handler: SharedHandler,
}

struct JobType {
    input: Value,
    output: Value,
    default_job: Option<JobName>,
}

struct CompiledType {
    input: Arc<dyn SchemaValidator>,
    output: Arc<dyn SchemaValidator>,
}

/// Everything needed to run a job, computed once per name.
pub(crate) struct ResolvedJob {
    pub(crate) description: Arc<JobDescription>,
    pub(crate) handler: SharedHandler,
    /// Input validators, root ancestor first.
    pub(crate) input_chain: Vec<Arc<dyn SchemaValidator>>,
    /// Output validators, root ancestor first.
    pub(crate) output_chain: Vec<Arc<dyn SchemaValidator>>,
}

#[derive(Default)]
struct RegistryState {
    jobs: BTreeMap<JobName, RegisteredJob>,
    types: BTreeMap<String, JobType>,
    resolved: HashMap<JobName, Arc<ResolvedJob>>,
    resolved_types: HashMap<String, Arc<CompiledType>>,
}

impl RegistryState {
    /// Type of `name`, inherited along the `extends` chain.
    fn effective_type(&self, name: &str) -> Option<&str> {
        let mut current = self.jobs.get(name)?;
        loop {
            if let Some(job_type) = &current.description.job_type {
                return Some(job_type.as_str());
            }
            current = self.jobs.get(current.description.extends.as_ref()?.as_str())?;
        }
    }

    fn set_default(&mut self, job_type: &str, name: &JobName) -> Result<(), JobError> {
        if !self.types.contains_key(job_type) {
            return Err(JobError::JobTypeDoesNotExist(job_type.to_string()));
        }
        if !self.jobs.contains_key(name.as_str()) {
            return Err(JobError::JobDoesNotExist(name.to_string()));
        }
        if self.effective_type(name.as_str()) != Some(job_type) {
            return Err(JobError::JobHandlerIsOfInvalidType {
                job: name.to_string(),
                expected: job_type.to_string(),
            });
        }
        if let Some(entry) = self.types.get_mut(job_type) {
            entry.default_job = Some(name.clone());
        }
        Ok(())
    }

    fn resolve_type(
        &mut self,
        compiler: &dyn SchemaCompiler,
        job_type: &str,
    ) -> Result<Arc<CompiledType>, JobError> {
        if let Some(compiled) = self.resolved_types.get(job_type) {
            return Ok(Arc::clone(compiled));
        }
        let entry = self
            .types
            .get(job_type)
            .ok_or_else(|| JobError::JobTypeDoesNotExist(job_type.to_string()))?;
        let compiled = Arc::new(CompiledType {
            input: compiler.compile(&entry.input)?,
            output: compiler.compile(&entry.output)?,
        });
        self.resolved_types
            .insert(job_type.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    fn resolve(
        &mut self,
        compiler: &dyn SchemaCompiler,
        name: &str,
    ) -> Result<Arc<ResolvedJob>, JobError> {
        if let Some(resolved) = self.resolved.get(name) {
            return Ok(Arc::clone(resolved));
        }
        let (description, handler) = {
            let job = self
                .jobs
                .get(name)
                .ok_or_else(|| JobError::JobDoesNotExist(name.to_string()))?;
            (Arc::clone(&job.description), Arc::clone(&job.handler))
        };

        let (mut input_chain, mut output_chain) = if let Some(parent) = &description.extends {
            let parent = self.resolve(compiler, parent.as_str())?;
            (parent.input_chain.clone(), parent.output_chain.clone())
        } else if let Some(job_type) = &description.job_type {
            let compiled = self.resolve_type(compiler, job_type)?;
            (
                vec![Arc::clone(&compiled.input)],
                vec![Arc::clone(&compiled.output)],
            )
        } else {
            (Vec::new(), Vec::new())
        };
        input_chain.push(compiler.compile(&description.input)?);
        output_chain.push(compiler.compile(&description.output)?);

        let resolved = Arc::new(ResolvedJob {
            description,
            handler,
            input_chain,
            output_chain,
        });
        self.resolved
            .insert(resolved.description.name.clone(), Arc::clone(&resolved));
        debug!(job = %name, depth = resolved.input_chain.len(), "job resolved");
        Ok(resolved)
    }
}

struct RegistryInner {
    compiler: Arc<dyn SchemaCompiler>,
    default_strategy: JobStrategyKind,
    state: RwLock<RegistryState>,
}

/// Shared registry of jobs and job types.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("JobRegistry")
            .field("jobs", &state.jobs.keys().collect::<Vec<_>>())
            .field("types", &state.types.keys().collect::<Vec<_>>())
            .field("default_strategy", &self.inner.default_strategy)
            .finish()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    /// Registry using [`BasicSchemaCompiler`] and the parallelize strategy by
    /// default.
    pub fn new() -> Self {
        Self::with_compiler(Arc::new(BasicSchemaCompiler::new()), JobStrategyKind::default())
    }

    /// Registry with a custom schema compiler and default strategy.
    pub fn with_compiler(
        compiler: Arc<dyn SchemaCompiler>,
        default_strategy: JobStrategyKind,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                compiler,
                default_strategy,
                state: RwLock::new(RegistryState::default()),
            }),
        }
    }

    /// Strategy applied to jobs registered without one.
    pub fn default_strategy(&self) -> JobStrategyKind {
        self.inner.default_strategy
    }

    /// Register a job type. Registering an existing type again is a no-op and
    /// keeps the original schemas; returns whether the type was added.
    pub fn register_type(
        &self,
        job_type: impl Into<String>,
        input: Value,
        output: Value,
    ) -> Result<bool, JobError> {
        let job_type = job_type.into();
        let mut state = self.inner.state.write();
        if state.types.contains_key(&job_type) {
            debug!(job_type = %job_type, "job type already registered");
            return Ok(false);
        }
        // Compile eagerly so a broken schema is reported here and not at the
        // first schedule.
        let compiled = Arc::new(CompiledType {
            input: self.inner.compiler.compile(&input)?,
            output: self.inner.compiler.compile(&output)?,
        });
        state.resolved_types.insert(job_type.clone(), compiled);
        state.types.insert(
            job_type.clone(),
            JobType {
                input,
                output,
                default_job: None,
            },
        );
        info!(job_type = %job_type, "job type registered");
        Ok(true)
    }

    /// Register `handler` under `name`.
    pub fn register<H: JobHandler>(
        &self,
        name: impl Into<JobName>,
        handler: H,
        options: RegisterOptions,
    ) -> Result<Arc<JobDescription>, JobError> {
        self.register_shared(name, Arc::new(handler), options)
    }

    /// Register an already shared handler under `name`.
    pub fn register_shared(
        &self,
        name: impl Into<JobName>,
        handler: SharedHandler,
        options: RegisterOptions,
    ) -> Result<Arc<JobDescription>, JobError> {
        let name = name.into();
        let RegisterOptions {
            input,
            output,
            channels,
            input_channel,
            extends,
            job_type,
            default_for_type,
            strategy,
        } = options;

        let mut state = self.inner.state.write();
        if state.jobs.contains_key(name.as_str()) {
            return Err(JobError::JobNameAlreadyRegistered(name.to_string()));
        }
        if let Some(parent) = &extends {
            if !state.jobs.contains_key(parent.as_str()) {
                return Err(JobError::JobDoesNotExist(parent.to_string()));
            }
        }
        if let Some(job_type) = &job_type {
            if !state.types.contains_key(job_type) {
                return Err(JobError::JobTypeDoesNotExist(job_type.clone()));
            }
        }
        let compiler = &self.inner.compiler;
        for schema in [&input, &output, &input_channel].into_iter().flatten() {
            compiler.compile(schema)?;
        }
        // Channel schemas are only checked here; channel traffic is not validated.
        for schema in channels.values() {
            compiler.compile(schema)?;
        }

        let mut description = JobDescription::new(name.clone());
        description.input = input.unwrap_or(Value::Bool(true));
        description.output = output.unwrap_or(Value::Bool(true));
        description.channels = channels;
        description.input_channel = input_channel.unwrap_or(Value::Bool(true));
        description.extends = extends;
        description.job_type = job_type;
        let description = Arc::new(description);

        let strategy = strategy.unwrap_or_else(|| self.inner.default_strategy.instantiate());
        let kind = strategy.kind();
        state.jobs.insert(
            name.clone(),
            RegisteredJob {
                description: Arc::clone(&description),
                handler: strategy.wrap(handler),
            },
        );
        if default_for_type {
            let job_type = state.effective_type(name.as_str()).map(str::to_string);
            let outcome = match job_type {
                Some(job_type) => state.set_default(&job_type, &name),
                None => Err(JobError::JobHandlerIsOfInvalidType {
                    job: name.to_string(),
                    expected: "any type".to_string(),
                }),
            };
            if let Err(err) = outcome {
                state.jobs.remove(name.as_str());
                return Err(err);
            }
        }
        info!(job = %name, strategy = %kind, "job registered");
        Ok(description)
    }

    /// Make `name` the default job of `job_type`.
    pub fn set_default_job(&self, job_type: &str, name: impl Into<JobName>) -> Result<(), JobError> {
        let name = name.into();
        self.inner.state.write().set_default(job_type, &name)?;
        debug!(job_type = %job_type, job = %name, "default job set");
        Ok(())
    }

    /// Default job of `job_type`.
    pub fn default_job_for_type(&self, job_type: &str) -> Result<JobName, JobError> {
        let state = self.inner.state.read();
        let entry = state
            .types
            .get(job_type)
            .ok_or_else(|| JobError::JobTypeDoesNotExist(job_type.to_string()))?;
        entry
            .default_job
            .clone()
            .ok_or_else(|| JobError::DefaultJobForTypeDoesNotExist(job_type.to_string()))
    }

    /// Description registered under `name`.
    pub fn get_description(&self, name: &str) -> Option<Arc<JobDescription>> {
        self.inner
            .state
            .read()
            .jobs
            .get(name)
            .map(|job| Arc::clone(&job.description))
    }

    /// True if a job is registered under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.inner.state.read().jobs.contains_key(name)
    }

    /// True if `job_type` is registered.
    pub fn has_type(&self, job_type: &str) -> bool {
        self.inner.state.read().types.contains_key(job_type)
    }

    /// Registered job names in lexical order.
    pub fn job_names(&self) -> Vec<JobName> {
        self.inner.state.read().jobs.keys().cloned().collect()
    }

    /// Jobs whose `extends` is exactly `name`.
    pub fn get_jobs_extending(&self, name: &str) -> Vec<Arc<JobDescription>> {
        self.inner
            .state
            .read()
            .jobs
            .values()
            .filter(|job| {
                job.description
                    .extends
                    .as_ref()
                    .is_some_and(|parent| parent.as_str() == name)
            })
            .map(|job| Arc::clone(&job.description))
            .collect()
    }

    pub(crate) fn resolve(&self, name: &str) -> Result<Arc<ResolvedJob>, JobError> {
        if let Some(resolved) = self.inner.state.read().resolved.get(name) {
            return Ok(Arc::clone(resolved));
        }
        self.inner
            .state
            .write()
            .resolve(self.inner.compiler.as_ref(), name)
    }
}
