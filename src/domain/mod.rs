pub mod aggregates;
pub mod events;
pub mod media;
pub mod pricing;
pub mod value_objects;
