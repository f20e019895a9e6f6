use crate::errors::FactoryError;
use crate::job::Job;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a blank job given its display name.
pub type JobConstructor = Arc<dyn Fn(&str) -> Box<dyn Job> + Send + Sync>;

/// Creates blank jobs by type tag.
pub trait JobFactory: Send + Sync {
    fn make(&self, job_type: &str, job_name: &str) -> Result<Box<dyn Job>, FactoryError>;
}

#[derive(Default, Clone)]
pub struct JobRegistry {
    constructors: HashMap<String, JobConstructor>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, job_type: &str, constructor: F)
    where
        F: Fn(&str) -> Box<dyn Job> + Send + Sync + 'static,
    {
        self.constructors
            .insert(job_type.to_string(), Arc::new(constructor));
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut job_types: Vec<String> = self.constructors.keys().cloned().collect();
        job_types.sort();
        job_types
    }

    pub fn get(&self, job_type: &str) -> Option<&JobConstructor> {
        self.constructors.get(job_type)
    }
}

impl JobFactory for JobRegistry {
    fn make(&self, job_type: &str, job_name: &str) -> Result<Box<dyn Job>, FactoryError> {
        let constructor = self
            .get(job_type)
            .ok_or_else(|| FactoryError::UnknownJobType(job_type.to_string()))?;
        Ok(constructor(job_name))
    }
}
