/*!
Capture a scrollable region of a web page as one tall PNG.

The container is scrolled stop by stop, the visible viewport is snapshotted after
each stop, and the snapshots are stitched into a single image. Elements that are
`fixed` or `sticky` inside the container are switched to static positioning for the
duration of the capture, so they show up once instead of at every seam.

The engine ([`ScrollCapturer`]) is generic over three seams defined in [`surface`].
[`Tab`] and [`Element`] implement them on top of the Chrome DevTools Protocol.

```no_run
use cdp_scroll_shot::{Browser, CaptureOptions};

# async fn run() -> anyhow::Result<()> {
let browser = Browser::new().await?;
let image = browser
    .capture_scrollable_url("https://example.com", "main", CaptureOptions::hidpi())
    .await?;
image.save("main.png")?;
browser.close_async().await?;
# Ok(())
# }
```
*/

mod browser;
pub mod capture;
mod element;
pub mod error;
pub mod neutralize;
pub mod plan;
pub mod session;
pub mod stitch;
pub mod surface;
mod tab;
mod transport;
pub mod types;
mod utils;
pub mod zoom;

pub use browser::{Browser, BrowserConfig};
pub use capture::{CaptureEvent, ScrollCapturer};
pub use element::{DescendantRef, Element};
pub use error::CaptureError;
pub use neutralize::NeutralizedElement;
pub use plan::ScrollPlan;
pub use session::{SessionGuard, SessionRegistry};
pub use stitch::StitchedImage;
pub use tab::Tab;
pub use types::{CaptureOptions, InlinePosition, Rect, ScrollMetrics, Viewport};
pub use zoom::{PlatformFamily, ScaleFactor, ZoomSelection};
