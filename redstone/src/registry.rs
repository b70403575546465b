//! Static registries associating a type id (tid) to the producer of a typed value.
//!
//! Registries are built once, usually behind a lazy static, and then only read. They
//! are used to dispatch packet ids to their decoders and window kinds to their
//! constructors.

use std::collections::HashMap;

use thiserror::Error;


/// A table mapping type ids to producers of type `P`, usually a function pointer.
#[derive(Debug, Clone)]
pub struct Registry<P> {
    /// Name of the family of types produced by this registry, used in errors.
    context: &'static str,
    /// Producers mapped to their type id.
    producers: HashMap<u8, P>,
}

impl<P: Copy> Registry<P> {

    /// Create a new empty registry for the given family of types.
    pub fn new(context: &'static str) -> Self {
        Self {
            context,
            producers: HashMap::new(),
        }
    }

    /// Register a producer for the given type id. Each tid must be registered once.
    pub fn register(&mut self, tid: u8, producer: P) -> &mut Self {
        let prev = self.producers.insert(tid, producer);
        debug_assert!(prev.is_none(), "tid {tid} registered twice for {}", self.context);
        self
    }

    /// Builder variant of [`Self::register`].
    pub fn with(mut self, tid: u8, producer: P) -> Self {
        self.register(tid, producer);
        self
    }

    /// Get the producer registered for the given type id.
    pub fn get(&self, tid: u8) -> Result<P, UnrecognizedType> {
        self.producers.get(&tid).copied().ok_or(UnrecognizedType {
            tid,
            context: self.context,
        })
    }

    /// Return true if a producer is registered for this type id.
    pub fn contains(&self, tid: u8) -> bool {
        self.producers.contains_key(&tid)
    }

    /// The name of the family of types produced by this registry.
    pub fn context(&self) -> &'static str {
        self.context
    }

}

impl<T, A> Registry<fn(A) -> T> {

    /// Find the producer for the given tid and call it with the given arguments.
    pub fn create(&self, tid: u8, args: A) -> Result<T, UnrecognizedType> {
        let producer = self.producers.get(&tid).copied().ok_or(UnrecognizedType {
            tid,
            context: self.context,
        })?;
        Ok(producer(args))
    }

}


/// Error returned when no producer is registered for a type id.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unrecognized type of {context}: {tid}")]
pub struct UnrecognizedType {
    /// The type id that has no registered producer.
    pub tid: u8,
    /// Name of the family of types that was looked up.
    pub context: &'static str,
}


#[cfg(test)]
mod tests {

    use super::*;

    #[derive(Debug, PartialEq)]
    enum Shape {
        Square(u32),
        Circle(u32),
    }

    fn shapes() -> Registry<fn(u32) -> Shape> {
        Registry::<fn(u32) -> Shape>::new("Shape")
            .with(1, Shape::Square)
            .with(2, Shape::Circle)
    }

    #[test]
    fn create_registered() {
        let reg = shapes();
        assert_eq!(reg.create(1, 4), Ok(Shape::Square(4)));
        assert_eq!(reg.create(2, 9), Ok(Shape::Circle(9)));
        assert!(reg.contains(2));
        assert!(!reg.contains(3));
    }

    #[test]
    fn create_unrecognized() {
        let err = shapes().create(66, 0).unwrap_err();
        assert_eq!(err, UnrecognizedType { tid: 66, context: "Shape" });
        assert_eq!(err.to_string(), "unrecognized type of Shape: 66");
    }

}
