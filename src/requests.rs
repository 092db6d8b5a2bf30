use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder, Response, cookie::Jar, redirect};
use scraper::{Html, Selector};
use tokio::io::AsyncWriteExt;

use crate::error::ScrapeError;
use crate::ratelimit::RateLimiter;
use crate::urls::PortalUrls;

/// The parsed login `<form>`: where to post and what to post.
///
/// Moodle refuses credential posts without the hidden `logintoken` input,
/// so every field the form carries is echoed back.
#[derive(Debug)]
pub struct LoginForm {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

/// Cookie-carrying HTTP client for the portal.
///
/// One shared cookie jar backs two reqwest clients: the normal one follows
/// redirects, the probe one doesn't (needed to read `Location` headers when
/// resolving file extensions).
pub struct PortalClient {
    client: Client,
    probe_client: Client,
    rate_limiter: RateLimiter,
}

impl PortalClient {
    pub fn new() -> anyhow::Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = ClientBuilder::new()
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        let probe_client = ClientBuilder::new()
            .cookie_provider(jar)
            .redirect(redirect::Policy::none())
            .build()?;
        let rate_limiter = RateLimiter::new();
        Ok(Self {
            client,
            probe_client,
            rate_limiter,
        })
    }

    /// Submit the login form and verify the session took.
    pub async fn login(
        &self,
        urls: &PortalUrls,
        username: &str,
        password: &str,
    ) -> anyhow::Result<()> {
        let login_url = urls.login_page();
        let page = self.fetch_url_body(&login_url).await?;
        let mut form = parse_login_form(&page).ok_or(ScrapeError::LoginFormMissing(login_url))?;
        form.fields.push(("username".to_string(), username.to_string()));
        form.fields.push(("password".to_string(), password.to_string()));

        self.rate_limiter.wait_until_ready().await;
        let response = self
            .client
            .post(urls.absolutize(&form.action))
            .form(&form.fields)
            .send()
            .await
            .context("submitting login form")?;
        let body = response.text().await?;
        if page_asks_for_credentials(&body) {
            return Err(ScrapeError::LoginRejected(username.to_string()).into());
        }
        Ok(())
    }

    pub async fn fetch_url_response(&self, url: &str) -> anyhow::Result<Response> {
        // Wait (non-blocking) until we're allowed to make a request according
        // to our self-imposed rate-limiting policy.
        self.rate_limiter.wait_until_ready().await;

        let response = self.client.get(url).send().await?;
        Ok(response)
    }

    pub async fn fetch_url_body(&self, url: &str) -> anyhow::Result<String> {
        let response = self.fetch_url_response(url).await?;
        let body = response.text().await?;
        Ok(body)
    }

    /// GET without following the redirect, for header inspection.
    pub async fn fetch_url_no_redirect(&self, url: &str) -> anyhow::Result<Response> {
        self.rate_limiter.wait_until_ready().await;
        let response = self.probe_client.get(url).send().await?;
        Ok(response)
    }

    /// Stream a file download into `dest`. The caller handles staging and
    /// the final rename; this only writes bytes.
    pub async fn download_to(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        let response = self
            .fetch_url_response(url)
            .await?
            .error_for_status()
            .with_context(|| format!("downloading {url}"))?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("creating {}", dest.display()))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("reading body of {url}"))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

/// Find the form carrying a password input and collect its prefilled
/// (mostly hidden) fields. Username/password are left to the caller.
pub fn parse_login_form(html: &str) -> Option<LoginForm> {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse("form").unwrap();
    let input_selector = Selector::parse("input").unwrap();
    let password_selector = Selector::parse("input[type=password]").unwrap();

    for form in document.select(&form_selector) {
        if form.select(&password_selector).next().is_none() {
            continue;
        }
        let action = form.value().attr("action")?.to_string();
        let fields = form
            .select(&input_selector)
            .filter_map(|input| {
                let name = input.value().attr("name")?;
                if name == "username" || name == "password" {
                    return None;
                }
                let value = input.value().attr("value").unwrap_or("");
                Some((name.to_string(), value.to_string()))
            })
            .collect();
        return Some(LoginForm { action, fields });
    }
    None
}

/// A page that still contains a password input didn't accept us.
pub fn page_asks_for_credentials(html: &str) -> bool {
    let document = Html::parse_document(html);
    let password_selector = Selector::parse("input[type=password]").unwrap();
    document.select(&password_selector).next().is_some()
}
