//! Service layer: the persistence gateway the relay and REST handlers
//! call into.

pub mod persistence;

#[cfg(test)]
pub mod test_support;
