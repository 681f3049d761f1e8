//! The fill engine: cross-fragment token resolution, image-safe
//! pruning, logo placement, version-control dates, and the pipeline
//! that runs a document through all of it in order.

mod logo;
mod pipeline;
mod prune;
mod resolver;
mod version;

pub use logo::{
    is_cover_eligible, LogoContext, LogoImage, LogoInserter, DEFAULT_LOGO_WIDTH_MM,
    HEADER_FOOTER_MAX_MM,
};
pub use pipeline::{fill_directory, fill_document, FillOptions};
pub use prune::{
    classify_images, is_image_bearing, structural_body_pass, structural_header_footer_pass,
    ImagePresence, StructuralCounts,
};
pub use resolver::{discover_tokens, ResolveOutcome, Resolver};
pub use version::{VersionControlOutcome, VersionControlUpdater};
