//! chatreel: deterministic chat-to-video and screenshot renderer for phone
//! messaging mockups.
//!
//! A render document (YAML or JSON) describes characters, messages and a visual
//! theme. [`video::render_video`] turns it into an H.264/AAC MP4 with typing
//! animations and synchronized send/receive sounds;
//! [`screenshot::render_screenshots`] produces static PNGs of the same layout.

pub mod artifact;
pub mod assets;
pub mod audio;
pub mod encoding;
pub mod error;
pub mod layout;
pub mod loader;
pub mod phone_frame;
pub mod progress;
pub mod raster;
pub mod renderer;
pub mod schema;
pub mod screenshot;
pub mod theme;
pub mod timeline;
pub mod video;
pub mod viewport;
