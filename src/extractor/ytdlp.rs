use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::errors::{ExtractError, Result};
use super::{ExtractOptions, Extractor, InfoDict, Query};

/// One yt-dlp site handler, run as a `yt-dlp` subprocess.
pub struct YtDlpExtractor {
    id: String,
    backend: String,
    pattern: Regex,
    generic: bool,
    ytdlp_path: String,
}

impl YtDlpExtractor {
    /// `id` doubles as the yt-dlp extractor name handed to `--use-extractors`.
    pub fn new(id: &str, backend: &str, pattern: &str) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            backend: backend.to_string(),
            pattern: Regex::new(pattern)?,
            generic: false,
            ytdlp_path: "yt-dlp".to_string(),
        })
    }

    pub fn generic() -> Result<Self> {
        let mut extractor = Self::new("generic", "generic", r"^https?://")?;
        extractor.generic = true;
        Ok(extractor)
    }

    pub fn with_ytdlp_path(mut self, path: String) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn youtube() -> Result<Self> {
        Self::new(
            "youtube",
            "youtube",
            concat!(
                r"^https?://(?:(?:www|m|music)\.)?",
                r"(?:youtube\.com/(?:watch\?(?:.*&)?v=|shorts/|embed/|live/|v/)|youtu\.be/)",
                r"[\w-]{11}"
            ),
        )
    }

    pub fn youtube_tab() -> Result<Self> {
        Self::new(
            "youtube:tab",
            "youtube",
            concat!(
                r"^https?://(?:(?:www|m|music)\.)?youtube\.com/",
                r"(?:playlist\?(?:.*&)?list=|channel/|c/|user/|@)[\w.-]+"
            ),
        )
    }

    pub fn youtube_search() -> Result<Self> {
        Self::new("youtube:search", "youtube", r"^ytsearch(?:\d+|all)?:")
    }

    pub fn site_handlers() -> Result<Vec<Self>> {
        const SOUNDCLOUD: &str = r"^https?://(?:(?:www|m)\.)?soundcloud\.com/[\w-]+";
        const BANDCAMP: &str = r"^https?://[\w-]+\.bandcamp\.com";
        Ok(vec![
            Self::new("soundcloud:set", "soundcloud", &format!(r"{}/sets/[\w-]+", SOUNDCLOUD))?,
            Self::new("soundcloud", "soundcloud", &format!(r"{}/[\w-]+", SOUNDCLOUD))?,
            Self::new("Bandcamp:album", "bandcamp", &format!(r"{}/album/[\w-]+", BANDCAMP))?,
            Self::new("Bandcamp", "bandcamp", &format!(r"{}/track/[\w-]+", BANDCAMP))?,
        ])
    }

    fn target(query: &Query) -> String {
        match query {
            Query::Url(url) => url.clone(),
            Query::Search { phrase, limit } => format!("ytsearch{}:{}", limit, phrase),
        }
    }

    fn command_args(&self, query: &Query, options: &ExtractOptions) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--no-check-certificate".to_string(),
            "--format".to_string(),
            options.format.clone(),
            "--default-search".to_string(),
            options.default_search.clone(),
        ];
        if options.flat_playlist {
            args.push("--flat-playlist".to_string());
        }
        if options.no_playlist {
            args.push("--no-playlist".to_string());
        }
        if let Some(cookies) = &options.cookie_path {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }
        if !self.generic {
            args.push("--use-extractors".to_string());
            args.push(self.id.clone());
        }
        args.push("--".to_string());
        args.push(Self::target(query));
        args
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> &str {
        &self.backend
    }

    fn suitable(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }

    fn is_generic(&self) -> bool {
        self.generic
    }

    async fn extract(
        &self,
        query: &Query,
        options: &ExtractOptions,
    ) -> std::result::Result<InfoDict, ExtractError> {
        let args = self.command_args(query, options);
        log::info!("🚀 [YT-DLP] {} {}", self.ytdlp_path, args.join(" "));

        let output = Command::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Process(format!("{} ({})", error.trim(), output.status)));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| ExtractError::Parse(format!("Invalid UTF-8 in yt-dlp output: {}", e)))?;
        let stdout = stdout.trim();
        if stdout.is_empty() || stdout == "null" {
            return Err(ExtractError::Empty);
        }

        log::debug!("📝 [YT-DLP] JSON output length: {} characters", stdout.len());
        Ok(serde_json::from_str(stdout)?)
    }
}
