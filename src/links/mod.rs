//! Hypermedia links: descriptors, URI templates, the link builder and the
//! association exposure table

pub mod builder;
pub mod link;
pub mod registry;

pub use builder::LinkBuilder;
pub use link::{Link, Links, UriTemplate};
pub use registry::{AssociationExposure, AssociationRegistry};
