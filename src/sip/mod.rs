//! EO-SIP package conversion: metadata checks, browse thumbnails, XML
//! generation, and ZIP assembly.

pub mod angles;
pub mod converter;
pub mod metadata;
pub mod thumbnail;
pub mod xml;
