use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::FetchSettings;
use crate::formats::{EntryPoint, Episode, episode_id_from_url};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const FIRST_EPISODE_SELECTOR: &str = "a#readFromFirstEpisode";
const NEXT_EPISODE_SELECTORS: &[&str] = &[
    "a.widget-episode-navigation-next",
    "a#contentMain-readNextEpisode",
];
const NEXT_EPISODE_TEXT: &str = "次のエピソード";
const TITLE_SELECTOR: &str = ".widget-episodeTitle";
const BODY_SELECTOR: &str = ".widget-episodeBody";
const UNKNOWN_TITLE: &str = "Unknown Title";

/// Where episodes come from. `fetch_episode` retries internally; an error means the
/// page could not be retrieved within the attempt budget.
#[async_trait]
pub trait EpisodeSource: Send + Sync {
    async fn entry_point(&self, work_url: &str) -> anyhow::Result<Option<EntryPoint>>;
    async fn fetch_episode(&self, url: &str) -> anyhow::Result<Episode>;
}

pub struct KakuyomuFetcher {
    client: reqwest::Client,
    work_url: String,
    settings: FetchSettings,
}

impl KakuyomuFetcher {
    pub fn new(work_url: &str, settings: FetchSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build episode http client")?;
        Ok(Self {
            client,
            work_url: work_url.to_owned(),
            settings,
        })
    }

    async fn get_html(&self, url: &str) -> anyhow::Result<(u16, String)> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(REFERER, &self.work_url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status().as_u16();
        let html = response.text().await.context("read response body")?;
        Ok((status, html))
    }
}

#[async_trait]
impl EpisodeSource for KakuyomuFetcher {
    async fn entry_point(&self, work_url: &str) -> anyhow::Result<Option<EntryPoint>> {
        tracing::info!(url = work_url, "locating first episode");
        let (status, html) = self.get_html(work_url).await?;
        if !(200..300).contains(&status) {
            anyhow::bail!("work page returned status {status}: {work_url}");
        }
        let base = Url::parse(work_url).context("parse work url")?;
        Ok(parse_work_page(&html, &base))
    }

    async fn fetch_episode(&self, url: &str) -> anyhow::Result<Episode> {
        let base = Url::parse(url).with_context(|| format!("parse episode url: {url}"))?;
        let attempts = self.settings.attempts.max(1);

        for attempt in 1..=attempts {
            tokio::time::sleep(self.settings.delay).await;

            match self.get_html(url).await {
                Ok((200, html)) => match parse_episode_page(&html, &base) {
                    Some(episode) => return Ok(episode),
                    None => {
                        tracing::warn!(url, attempt, attempts, "episode body not found");
                        if attempt == attempts {
                            tracing::debug!(url, %html, "last page without episode body");
                        }
                    }
                },
                Ok((status, _)) => {
                    tracing::warn!(url, attempt, attempts, status, "episode request failed");
                }
                Err(err) => {
                    tracing::warn!(url, attempt, attempts, error = %format!("{err:#}"), "episode request failed");
                }
            }
        }

        anyhow::bail!("could not fetch episode after {attempts} attempt(s): {url}")
    }
}

pub fn parse_work_page(html: &str, base: &Url) -> Option<EntryPoint> {
    let document = Html::parse_document(html);
    let work_title = work_title(&document);

    if let Some(href) = first_href(&document, FIRST_EPISODE_SELECTOR)
        && let Ok(url) = base.join(&href)
    {
        return Some(EntryPoint {
            first_episode_url: url.to_string(),
            work_title,
        });
    }

    let anchors = Selector::parse("a[href]").ok()?;
    let first = document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| url.path().starts_with("/works/"))
        .filter_map(|url| {
            let id = episode_id_from_url(url.as_str())?;
            Some((id, url))
        })
        .min_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))?;

    tracing::debug!(url = %first.1, "first-episode button missing; using lowest episode id");
    Some(EntryPoint {
        first_episode_url: first.1.to_string(),
        work_title,
    })
}

/// `None` when the page has no episode body (anti-bot page, layout change, ...).
pub fn parse_episode_page(html: &str, url: &Url) -> Option<Episode> {
    let document = Html::parse_document(html);

    let body_selector = Selector::parse(BODY_SELECTOR).ok()?;
    let body = document
        .select(&body_selector)
        .next()
        .map(stripped_lines)
        .filter(|body| !body.is_empty())?;

    let title = Selector::parse(TITLE_SELECTOR)
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .map(|el| el.text().collect::<String>().trim().to_owned())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_owned());

    let next_url = find_next_link(&document, url);

    Some(Episode {
        id: episode_id_from_url(url.as_str()).unwrap_or_default(),
        url: url.to_string(),
        title,
        body,
        next_url,
    })
}

fn find_next_link(document: &Html, current: &Url) -> Option<String> {
    let href = NEXT_EPISODE_SELECTORS
        .iter()
        .find_map(|css| first_href(document, css))
        .or_else(|| {
            let anchors = Selector::parse("a[href]").ok()?;
            document
                .select(&anchors)
                .find(|a| a.text().collect::<String>().contains(NEXT_EPISODE_TEXT))
                .and_then(|a| a.value().attr("href").map(str::to_owned))
        })?;

    current.join(&href).ok().map(|url| url.to_string())
}

fn first_href(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_owned)
}

fn work_title(document: &Html) -> Option<String> {
    let og = Selector::parse(r#"meta[property="og:title"]"#)
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_owned());
    og.or_else(|| {
        let selector = Selector::parse("title").ok()?;
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_owned())
    })
    .filter(|title| !title.is_empty())
}

fn stripped_lines(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
