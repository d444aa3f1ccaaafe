//! `relaydl info <url>` – query the remote for metadata.

use anyhow::Result;
use relaydl_core::remote::VideoMetadata;
use relaydl_core::service::DownloadService;

pub async fn run_info(service: &DownloadService, url: &str) -> Result<()> {
    let meta = service.fetch_metadata(url).await?;
    print!("{}", describe(&meta));
    Ok(())
}

pub(crate) fn describe(meta: &VideoMetadata) -> String {
    let mut out = String::new();
    out.push_str(&format!("Title:    {}\n", meta.title.as_deref().unwrap_or("-")));
    out.push_str(&format!(
        "Uploader: {}\n",
        meta.uploader_or_channel().unwrap_or("-")
    ));
    if let Some(secs) = meta.duration {
        out.push_str(&format!("Duration: {}\n", format_duration(secs)));
    }
    if meta.is_live == Some(true) {
        out.push_str("Live:     yes\n");
    }
    let heights = meta.available_heights();
    if heights.is_empty() {
        out.push_str("Heights:  none (audio only?)\n");
    } else {
        let list: Vec<String> = heights.iter().map(|h| format!("{}p", h)).collect();
        out.push_str(&format!("Heights:  {}\n", list.join(", ")));
    }
    out
}

fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
