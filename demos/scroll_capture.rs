use cdp_scroll_shot::{Browser, CaptureOptions, ScrollCapturer, StitchedImage, Viewport};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let browser = Browser::new().await?;

    // Option 1: one call, fresh tab, default 72 DPI output
    let image = browser
        .capture_scrollable_html(FEED_HTML, "#feed", CaptureOptions::new())
        .await?;
    let name = StitchedImage::default_file_name();
    image.save(&name)?;
    println!("Saved {name} ({}x{})", image.width, image.height);

    // Option 2: drive the tab yourself and listen for the outcome
    let tab = browser.new_tab().await?;
    tab.set_content(FEED_HTML).await?;
    let options = CaptureOptions::hidpi()
        .with_settle_delay(Duration::from_millis(150))
        .with_viewport(Viewport::new(800, 900));
    let capturer = ScrollCapturer::new(options);
    let mut events = capturer.subscribe();

    let image = tab.capture_scrollable_with(&capturer, "#feed").await?;
    println!("Event: {:?}", events.recv().await?);
    println!("HiDPI capture is {} bytes", image.data.len());
    tab.close().await?;

    browser.close_async().await?;
    Ok(())
}

const FEED_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<body style="margin: 0; background: #f4f4f4; font-family: sans-serif;">
    <div id="feed" style="width: 480px; height: 600px; margin: 40px auto; overflow-y: auto; background: white;">
        <div style="position: sticky; top: 0; padding: 12px; background: #d32f2f; color: white;">Sticky header</div>
        <div style="height: 3000px; background: repeating-linear-gradient(#fff 0 40px, #eee 40px 80px);"></div>
    </div>
</body>
</html>"#;
