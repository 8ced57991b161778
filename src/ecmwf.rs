//! Clients for the ECMWF web API (MARS) and the Copernicus Climate Data
//! Store.
//!
//! Both services share one shape: submit a JSON request, poll the job URL
//! until it reaches a terminal state, then stream the result file to disk.
//! A failed job aborts the run.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_POLL_SECS: u64 = 10;

/// A MARS archive request, serialised verbatim as the request body.
#[derive(Debug, Clone, Serialize)]
pub struct MarsRequest {
    pub class: String,
    pub date: String,
    pub expver: String,
    pub fcmonth: String,
    pub levtype: String,
    pub method: String,
    pub area: String,
    pub grid: String,
    pub number: String,
    pub origin: String,
    pub param: String,
    pub stream: String,
    pub system: String,
    pub time: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
}

impl MarsRequest {
    /// SEAS5 monthly-mean total-precipitation-rate request for one
    /// publication year.
    ///
    /// Forecasts up to and including 2016 carry 25 ensemble members, later
    /// ones 51.
    pub fn seas5_monthly(year: i32, area: &crate::grid::BoundingBox) -> Self {
        let members = if year <= 2016 { 25 } else { 51 };

        Self {
            class: "od".to_string(),
            date: month_starts(year),
            expver: "1".to_string(),
            fcmonth: join_range(1..=7),
            levtype: "sfc".to_string(),
            method: "1".to_string(),
            area: area.mars_area(),
            grid: "0.4/0.4".to_string(),
            number: join_range(0..=members - 1),
            origin: "ecmwf".to_string(),
            param: "228.172".to_string(),
            stream: "msmm".to_string(),
            system: "5".to_string(),
            time: "00:00:00".to_string(),
            kind: "fcmean".to_string(),
            target: "output".to_string(),
        }
    }
}

/// The 12 month-start dates of a year, `/`-separated.
fn month_starts(year: i32) -> String {
    (1..=12)
        .map(|month| format!("{year}-{month:02}-01"))
        .collect::<Vec<_>>()
        .join("/")
}

fn join_range(range: std::ops::RangeInclusive<i32>) -> String {
    range
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Job document returned by both services while polling.
#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default, alias = "state")]
    status: String,
    #[serde(default)]
    href: Option<String>,
    #[serde(default, alias = "location")]
    result: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default, alias = "retry")]
    retry_secs: Option<u64>,
    #[serde(default)]
    request_id: Option<String>,
}

impl Job {
    fn is_running(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "queued" | "active" | "running"
        )
    }

    fn is_complete(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "complete" | "completed"
        )
    }

    fn error_text(&self) -> String {
        self.error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default()
    }
}

/// Client for MARS retrievals over the ECMWF web API.
pub struct MarsClient {
    http: Client,
    url: String,
    key: String,
    email: String,
}

impl MarsClient {
    pub fn new(config: &crate::config::MarsConfig) -> Self {
        Self {
            http: Client::new(),
            url: config.url.clone(),
            key: config.key.clone(),
            email: config.email.clone(),
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("X-ECMWF-KEY", &self.key)
            .header("From", &self.email)
            .header("Accept", "application/json")
    }

    /// Submits the request and downloads the resulting GRIB to `target`.
    pub async fn retrieve(
        &self,
        request: &MarsRequest,
        target: &Path,
        bar: &ProgressBar,
    ) -> Result<()> {
        let submit_url = format!("{}/services/mars/requests", self.url);
        let response = self
            .authed(self.http.post(&submit_url).json(request))
            .send()
            .await
            .context("failed to submit MARS request")?;
        let job: Job = into_json(response).await?;

        let href = job
            .href
            .clone()
            .ok_or_else(|| anyhow!("MARS submission returned no job URL"))?;
        debug!(href = %href, "MARS request accepted");

        let result = self.wait(&job, &href).await?;
        download_to_file(self.authed(self.http.get(&result)), target, bar).await?;

        // release the request slot; failing to do so is harmless
        let _ = self.authed(self.http.delete(&href)).send().await;

        Ok(())
    }

    async fn wait(&self, submitted: &Job, href: &str) -> Result<String> {
        let mut delay = submitted.retry_secs.unwrap_or(DEFAULT_POLL_SECS);
        if submitted.is_complete() {
            return submitted
                .result
                .clone()
                .ok_or_else(|| anyhow!("complete MARS job carried no result URL"));
        }

        loop {
            tokio::time::sleep(Duration::from_secs(delay)).await;

            let response = self
                .authed(self.http.get(href))
                .send()
                .await
                .context("failed to poll MARS job")?;
            let job: Job = into_json(response).await?;

            if job.is_complete() {
                return job
                    .result
                    .ok_or_else(|| anyhow!("complete MARS job carried no result URL"));
            }
            if !job.is_running() {
                bail!(
                    "MARS job ended in state `{}`: {}",
                    job.status,
                    job.error_text()
                );
            }

            delay = job.retry_secs.unwrap_or(delay);
            debug!(status = %job.status, "MARS job still running");
        }
    }
}

/// An ERA5-Land monthly-means request for the CDS.
#[derive(Debug, Clone, Serialize)]
pub struct Era5LandMonthlyRequest {
    pub product_type: String,
    pub variable: Vec<String>,
    pub year: Vec<String>,
    pub month: Vec<String>,
    pub time: String,
    pub area: [f64; 4],
    pub format: String,
}

impl Era5LandMonthlyRequest {
    pub fn new(years: std::ops::RangeInclusive<i32>, months: &[u32], area: &crate::grid::BoundingBox) -> Self {
        Self {
            product_type: "monthly_averaged_reanalysis".to_string(),
            variable: vec![
                "snow_cover".to_string(),
                "total_precipitation".to_string(),
                "volumetric_soil_water_layer_1".to_string(),
                "volumetric_soil_water_layer_2".to_string(),
                "volumetric_soil_water_layer_3".to_string(),
            ],
            year: years.map(|y| y.to_string()).collect(),
            month: months.iter().map(|m| format!("{m:02}")).collect(),
            time: "00:00".to_string(),
            area: area.cds_area(),
            format: "grib".to_string(),
        }
    }
}

/// Client for the Copernicus Climate Data Store.
pub struct CdsClient {
    http: Client,
    url: String,
    uid: String,
    key: String,
}

impl CdsClient {
    pub fn new(config: &crate::config::CdsConfig) -> Result<Self> {
        let (uid, key) = config
            .key
            .split_once(':')
            .ok_or_else(|| anyhow!("CDS key must be of the form UID:KEY"))?;

        Ok(Self {
            http: Client::new(),
            url: config.url.clone(),
            uid: uid.to_string(),
            key: key.to_string(),
        })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.uid, Some(&self.key))
    }

    /// Submits a retrieval for `dataset` and downloads the result to
    /// `target`.
    pub async fn retrieve<R: Serialize>(
        &self,
        dataset: &str,
        request: &R,
        target: &Path,
        bar: &ProgressBar,
    ) -> Result<()> {
        let submit_url = format!("{}/resources/{dataset}", self.url);
        let response = self
            .authed(self.http.post(&submit_url).json(request))
            .send()
            .await
            .context("failed to submit CDS request")?;
        let job: Job = into_json(response).await?;

        let result = self.wait(job).await?;
        download_to_file(self.authed(self.http.get(&result)), target, bar).await?;

        Ok(())
    }

    async fn wait(&self, mut job: Job) -> Result<String> {
        loop {
            if job.is_complete() {
                return job
                    .result
                    .ok_or_else(|| anyhow!("completed CDS task carried no download location"));
            }
            if !job.is_running() {
                bail!(
                    "CDS task ended in state `{}`: {}",
                    job.status,
                    job.error_text()
                );
            }

            let request_id = job
                .request_id
                .as_ref()
                .ok_or_else(|| anyhow!("CDS task carried no request id"))?;
            let poll_url = format!("{}/tasks/{request_id}", self.url);

            tokio::time::sleep(Duration::from_secs(DEFAULT_POLL_SECS)).await;
            debug!(status = %job.status, request_id, "CDS task still running");

            let response = self
                .authed(self.http.get(&poll_url))
                .send()
                .await
                .context("failed to poll CDS task")?;
            let polled: Job = into_json(response).await?;
            // tasks endpoint does not echo the id back
            job = Job {
                request_id: job.request_id.clone(),
                ..polled
            };
        }
    }
}

async fn into_json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("request failed with {status}: {body}");
    }

    response.json().await.context("failed to decode response")
}

/// Streams a prepared GET request to a file, with a byte progress bar when
/// the server reports a content length.
pub async fn download_to_file(request: RequestBuilder, target: &Path, bar: &ProgressBar) -> Result<()> {
    let response = request.send().await.context("failed to start download")?;

    if !response.status().is_success() {
        bail!("download failed with {}", response.status());
    }

    let total_size = response.content_length().unwrap_or(0);
    if total_size > 0 {
        bar.set_length(total_size);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {eta}",
            )
            .unwrap()
            .progress_chars("=> "),
        );
    }

    let mut file = File::create(target)
        .with_context(|| format!("failed to create {}", target.display()))?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("error reading download chunk")?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        bar.set_position(downloaded);
    }

    Ok(())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use crate::grid::AOI_BOUNDS;

    use super::*;

    #[test]
    fn should_build_seas5_request_with_25_members() {
        let request = MarsRequest::seas5_monthly(1981, &AOI_BOUNDS);

        assert!(request.date.starts_with("1981-01-01/1981-02-01"));
        assert!(request.date.ends_with("1981-12-01"));
        assert_eq!(request.date.split('/').count(), 12);
        assert_eq!(request.fcmonth, "1/2/3/4/5/6/7");
        assert_eq!(request.area, "39/60/29/76");
        assert!(request.number.ends_with("/24"));
        assert_eq!(request.number.split('/').count(), 25);
    }

    #[test]
    fn should_build_seas5_request_with_51_members() {
        let request = MarsRequest::seas5_monthly(2017, &AOI_BOUNDS);

        assert!(request.number.ends_with("/50"));
        assert_eq!(request.number.split('/').count(), 51);
    }

    #[test]
    fn should_serialise_type_field() {
        let request = MarsRequest::seas5_monthly(1990, &AOI_BOUNDS);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["type"], "fcmean");
        assert_eq!(json["param"], "228.172");
        assert_eq!(json["stream"], "msmm");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn should_build_era5_land_request() {
        let request =
            Era5LandMonthlyRequest::new(1981..=1983, &[11, 12, 1, 2, 3, 4, 5], &AOI_BOUNDS);

        assert_eq!(request.year, vec!["1981", "1982", "1983"]);
        assert_eq!(
            request.month,
            vec!["11", "12", "01", "02", "03", "04", "05"]
        );
        assert_eq!(request.area, [39.0, 60.0, 29.0, 76.0]);
        assert_eq!(request.variable.len(), 5);
        assert_eq!(request.format, "grib");
    }

    #[test]
    fn should_classify_job_states() {
        let job: Job = serde_json::from_str(r#"{"status": "queued", "href": "x"}"#).unwrap();
        assert!(job.is_running());
        assert!(!job.is_complete());

        let job: Job =
            serde_json::from_str(r#"{"state": "completed", "location": "http://x"}"#).unwrap();
        assert!(job.is_complete());
        assert_eq!(job.result.as_deref(), Some("http://x"));
    }
}
