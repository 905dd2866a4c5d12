use crate::error::{configuration_error, BspError};
use hashbrown::HashMap;
use std::any::Any;
use std::sync::Arc;

/// Named read-only collections shared with every worker for the whole run.
#[derive(Default, Clone)]
pub struct BroadcastSets {
    sets: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl BroadcastSets {
    pub fn insert<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
        set: Vec<T>,
    ) -> Result<(), BspError> {
        if self.sets.contains_key(name) {
            return Err(configuration_error(format!(
                "Broadcast set '{}' is added more than once",
                name
            )));
        }
        self.sets.insert(name.to_string(), Arc::new(set));
        Ok(())
    }

    /// Returns `None` if no set was added under `name` or if it holds a different element type.
    pub fn get<T: 'static>(&self, name: &str) -> Option<&[T]> {
        self.sets.get(name).and_then(|set| set.downcast_ref::<Vec<T>>()).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}
