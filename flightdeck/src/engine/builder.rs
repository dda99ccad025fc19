//! Fluent job submission.

use super::Engine;
use crate::errors::JobError;
use crate::state::{keys, InputParameters};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Collects the pieces of a job and submits it.
///
/// Parameter errors are remembered and reported by `submit`, so the chain
/// never has to be broken up.
#[derive(Debug)]
#[must_use]
pub struct JobBuilder<'a> {
    engine: &'a Engine,
    flight_type: Option<String>,
    job_id: Option<String>,
    description: Option<String>,
    result_path: Option<String>,
    inputs: InputParameters,
    error: Option<JobError>,
}

impl<'a> JobBuilder<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            flight_type: None,
            job_id: None,
            description: None,
            result_path: None,
            inputs: InputParameters::new(),
            error: None,
        }
    }

    /// Sets the flight type to run.
    pub fn flight_type(mut self, flight_type: impl Into<String>) -> Self {
        self.flight_type = Some(flight_type.into());
        self
    }

    /// Uses an explicit job id instead of a generated one.
    pub fn job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Sets the job description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the path of the result URL.
    pub fn result_path(mut self, result_path: impl Into<String>) -> Self {
        self.result_path = Some(result_path.into());
        self
    }

    /// Adds an input parameter.
    pub fn add_parameter(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if self.error.is_some() {
            return self;
        }

        let key = key.into();
        if key.trim().is_empty() {
            self.error = Some(JobError::InvalidParameter(
                "Parameter name cannot be null or blanks.".to_string(),
            ));
            return self;
        }

        match serde_json::to_value(value) {
            Ok(value) => self.inputs.insert(key, value),
            Err(e) => {
                self.error = Some(JobError::InvalidParameter(format!(
                    "Parameter '{key}' could not be serialized: {e}"
                )));
            }
        }
        self
    }

    fn prepare(mut self) -> Result<(&'a Engine, String, InputParameters, Option<String>), JobError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let flight_type = self
            .flight_type
            .ok_or_else(|| JobError::InvalidParameter("A flight type is required".to_string()))?;

        for (key, value) in [
            (keys::DESCRIPTION, self.description),
            (keys::RESULT_PATH, self.result_path),
        ] {
            if let Some(value) = value {
                if !self.inputs.contains_key(key) {
                    self.inputs.insert(key, serde_json::Value::String(value));
                }
            }
        }

        Ok((self.engine, flight_type, self.inputs, self.job_id))
    }

    /// Submits the job and returns its id.
    ///
    /// # Errors
    ///
    /// Returns the first parameter error, or any error from `Engine::submit`.
    pub async fn submit(self) -> Result<String, JobError> {
        let (engine, flight_type, inputs, job_id) = self.prepare()?;
        engine.submit(&flight_type, inputs, job_id).await
    }

    /// Submits the job, waits for it and returns its result.
    ///
    /// # Errors
    ///
    /// Returns submission errors, `JobError::Timeout`, or the job's failure.
    pub async fn submit_and_wait<T: DeserializeOwned>(self) -> Result<T, JobError> {
        let (engine, flight_type, inputs, job_id) = self.prepare()?;
        engine.submit_and_wait(&flight_type, inputs, job_id).await
    }
}
