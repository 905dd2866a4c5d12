use crate::error::{configuration_error, BspError};
use hashbrown::HashMap;
use std::any::{Any, TypeId};
use std::marker::PhantomData;

/// A named accumulator merged across all compute invocations of a superstep.
///
/// `aggregate` must be commutative and associative: partial values are merged per worker and
/// then across workers in no particular order.
pub trait Aggregator: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    fn initial_value(&self) -> Self::Value;

    fn aggregate(&self, accumulator: &mut Self::Value, value: Self::Value);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LongSumAggregator;

impl Aggregator for LongSumAggregator {
    type Value = i64;

    fn initial_value(&self) -> i64 {
        0
    }

    fn aggregate(&self, accumulator: &mut i64, value: i64) {
        *accumulator += value;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DoubleSumAggregator;

impl Aggregator for DoubleSumAggregator {
    type Value = f64;

    fn initial_value(&self) -> f64 {
        0.0
    }

    fn aggregate(&self, accumulator: &mut f64, value: f64) {
        *accumulator += value;
    }
}

/// Keeps the largest value seen, `None` until something is aggregated.
#[derive(Debug, Clone, Copy)]
pub struct MaxAggregator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> MaxAggregator<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for MaxAggregator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone + Send + Sync + 'static> Aggregator for MaxAggregator<T> {
    type Value = Option<T>;

    fn initial_value(&self) -> Option<T> {
        None
    }

    fn aggregate(&self, accumulator: &mut Option<T>, value: Option<T>) {
        if value > *accumulator {
            *accumulator = value;
        }
    }
}

pub type AggregateValue = Box<dyn Any + Send + Sync>;

/// Type-erased view of an `Aggregator`, so aggregators of different value types can share one
/// registry.
pub trait ErasedAggregator: Send + Sync {
    fn value_type(&self) -> TypeId;
    fn initial(&self) -> AggregateValue;
    fn merge(&self, accumulator: &mut AggregateValue, value: AggregateValue);
}

struct TypedAggregator<A: Aggregator>(A);

impl<A: Aggregator> ErasedAggregator for TypedAggregator<A> {
    fn value_type(&self) -> TypeId {
        TypeId::of::<A::Value>()
    }

    fn initial(&self) -> AggregateValue {
        Box::new(self.0.initial_value())
    }

    fn merge(&self, accumulator: &mut AggregateValue, value: AggregateValue) {
        // Both sides are created through this aggregator, so the downcasts cannot miss.
        if let (Some(accumulator), Ok(value)) =
            (accumulator.downcast_mut::<A::Value>(), value.downcast::<A::Value>())
        {
            self.0.aggregate(accumulator, *value);
        }
    }
}

/// The aggregators of one run, registered by name before the first superstep.
#[derive(Default)]
pub struct AggregatorRegistry {
    aggregators: HashMap<String, Box<dyn ErasedAggregator>>,
}

impl AggregatorRegistry {
    pub fn register<A: Aggregator>(&mut self, name: &str, aggregator: A) -> Result<(), BspError> {
        if self.aggregators.contains_key(name) {
            return Err(configuration_error(format!(
                "Aggregator '{}' is registered more than once",
                name
            )));
        }
        self.aggregators.insert(name.to_string(), Box::new(TypedAggregator(aggregator)));
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.aggregators.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&dyn ErasedAggregator> {
        self.aggregators.get(name).map(|aggregator| &**aggregator)
    }

    /// Fresh per-worker accumulators for one superstep.
    pub fn local_aggregates(&self) -> LocalAggregates {
        LocalAggregates {
            values: self
                .aggregators
                .iter()
                .map(|(name, aggregator)| (name.clone(), aggregator.initial()))
                .collect(),
        }
    }

    /// Merges the partial values of all workers into the global aggregates of a superstep.
    pub fn merge_partials<I: IntoIterator<Item = LocalAggregates>>(
        &self,
        partials: I,
    ) -> GlobalAggregates {
        let mut merged = self.local_aggregates();
        for partial in partials {
            for (name, value) in partial.values {
                if let (Some(aggregator), Some(accumulator)) =
                    (self.aggregators.get(&name), merged.values.get_mut(&name))
                {
                    aggregator.merge(accumulator, value);
                }
            }
        }
        GlobalAggregates { values: merged.values }
    }
}

/// Accumulators owned by one worker for the duration of one superstep.
pub struct LocalAggregates {
    values: HashMap<String, AggregateValue>,
}

impl LocalAggregates {
    pub fn handle<'a, T: 'static>(
        &'a mut self,
        registry: &'a AggregatorRegistry,
        name: &str,
    ) -> Option<AggregatorHandle<'a, T>> {
        let aggregator = registry.get(name)?;
        if aggregator.value_type() != TypeId::of::<T>() {
            return None;
        }
        let accumulator = self.values.get_mut(name)?;
        Some(AggregatorHandle { aggregator, accumulator, _marker: PhantomData })
    }

    pub fn current<T: 'static>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(|value| value.downcast_ref::<T>())
    }
}

/// Accumulates values into one aggregator on behalf of a single compute invocation.
pub struct AggregatorHandle<'a, T> {
    aggregator: &'a dyn ErasedAggregator,
    accumulator: &'a mut AggregateValue,
    _marker: PhantomData<fn(T)>,
}

impl<'a, T: Send + Sync + 'static> AggregatorHandle<'a, T> {
    pub fn aggregate(&mut self, value: T) {
        self.aggregator.merge(self.accumulator, Box::new(value));
    }
}

/// The merged aggregates of a completed superstep, visible during the following one.
#[derive(Default)]
pub struct GlobalAggregates {
    values: HashMap<String, AggregateValue>,
}

impl GlobalAggregates {
    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(|value| value.downcast_ref::<T>())
    }
}

#[cfg(test)]
mod tests {
    use crate::aggregator::{
        AggregatorRegistry, DoubleSumAggregator, LongSumAggregator, MaxAggregator,
    };

    fn registry() -> AggregatorRegistry {
        let mut registry = AggregatorRegistry::default();
        registry.register("sum", LongSumAggregator).expect("Registering 'sum'");
        registry.register("weight", DoubleSumAggregator).expect("Registering 'weight'");
        registry.register("max", MaxAggregator::<u32>::new()).expect("Registering 'max'");
        registry
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = registry();
        assert!(registry.register("sum", LongSumAggregator).is_err());
        let mut names = registry.names().collect::<Vec<_>>();
        names.sort_unstable();
        assert_eq!(names, vec!["max", "sum", "weight"]);
    }

    #[test]
    fn handles_are_typed() {
        let registry = registry();
        let mut local = registry.local_aggregates();
        assert!(local.handle::<i64>(&registry, "sum").is_some());
        assert!(local.handle::<u64>(&registry, "sum").is_none());
        assert!(local.handle::<i64>(&registry, "missing").is_none());
    }

    #[test]
    fn partials_merge_independent_of_order() {
        let registry = registry();
        let mut partials = Vec::new();
        for values in &[vec![1_i64, 2], vec![10], vec![], vec![4, 7]] {
            let mut local = registry.local_aggregates();
            for value in values {
                local.handle::<i64>(&registry, "sum").expect("sum handle").aggregate(*value);
                local
                    .handle::<Option<u32>>(&registry, "max")
                    .expect("max handle")
                    .aggregate(Some(*value as u32));
            }
            partials.push(local);
        }
        partials.reverse();
        let global = registry.merge_partials(partials);
        assert_eq!(global.get::<i64>("sum"), Some(&24));
        assert_eq!(global.get::<Option<u32>>("max"), Some(&Some(10)));
        assert_eq!(global.get::<f64>("weight"), Some(&0.0));
        assert_eq!(global.get::<f64>("sum"), None);
    }
}
