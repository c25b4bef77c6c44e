pub mod desktop;
pub mod image_matcher;
pub mod locator;
pub mod ocr;
pub mod traits;
pub mod uia;

#[cfg(test)]
pub(crate) mod testing;

pub use desktop::SystemDesktop;
pub use locator::{LocateOutcome, Location, Locator};
pub use traits::{DesktopDriver, Position, Target};
pub use uia::{UiSelector, UiSession, UiTree, UnavailableUiTree};
