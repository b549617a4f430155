//! Reference DEM acquisition from a global terrain-data service.
//!
//! This module is only available when the `download` feature is enabled.
//!
//! The service is queried with a single HTTP GET carrying the DEM product,
//! the bounding box, the output format and an API key:
//!
//! ```text
//! {endpoint}?demtype=AW3D30&south=45&north=45.1&west=10&east=10.1&outputFormat=GTiff&API_Key=...
//! ```
//!
//! A `200` response body is the GeoTIFF itself and is saved verbatim. Any
//! other status is a failure whose body text is surfaced. There are no
//! retries.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use tracing::{debug, info, warn};

use crate::error::{AlignError, Result};
use crate::geo::Bounds;
use crate::pipeline::DemSource;

/// Default terrain-service endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://portal.opentopography.org/API/globaldem";

/// Output format requested from the service.
pub const OUTPUT_FORMAT: &str = "GTiff";

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "DEMALIGN_API_KEY";
/// Environment variable selecting the DEM product.
pub const ENV_DEM_TYPE: &str = "DEMALIGN_DEM_TYPE";
/// Environment variable overriding the endpoint.
pub const ENV_ENDPOINT: &str = "DEMALIGN_ENDPOINT";
/// Environment variable setting the request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "DEMALIGN_TIMEOUT_SECS";

/// Global DEM products offered by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DemType {
    /// SRTM GL3, 90 m.
    Srtmgl3,
    /// SRTM GL1, 30 m.
    Srtmgl1,
    /// SRTM GL1 ellipsoidal, 30 m.
    Srtmgl1E,
    /// ALOS World 3D, 30 m.
    #[default]
    Aw3d30,
    /// ALOS World 3D ellipsoidal, 30 m.
    Aw3d30E,
    /// SRTM15+ global bathymetry and topography, 500 m.
    Srtm15Plus,
    /// NASADEM, 30 m.
    Nasadem,
    /// Copernicus GLO-30.
    Cop30,
    /// Copernicus GLO-90.
    Cop90,
    /// Continental Europe digital terrain model, 30 m.
    EuDtm,
    /// GEDI L3, 1 km.
    GediL3,
    /// GEBCO ice surface topography.
    GebcoIceTopo,
    /// GEBCO sub-ice topography.
    GebcoSubIceTopo,
}

impl DemType {
    /// All products, in service documentation order.
    pub const ALL: [DemType; 13] = [
        DemType::Srtmgl3,
        DemType::Srtmgl1,
        DemType::Srtmgl1E,
        DemType::Aw3d30,
        DemType::Aw3d30E,
        DemType::Srtm15Plus,
        DemType::Nasadem,
        DemType::Cop30,
        DemType::Cop90,
        DemType::EuDtm,
        DemType::GediL3,
        DemType::GebcoIceTopo,
        DemType::GebcoSubIceTopo,
    ];

    /// Identifier used in the `demtype` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            DemType::Srtmgl3 => "SRTMGL3",
            DemType::Srtmgl1 => "SRTMGL1",
            DemType::Srtmgl1E => "SRTMGL1_E",
            DemType::Aw3d30 => "AW3D30",
            DemType::Aw3d30E => "AW3D30_E",
            DemType::Srtm15Plus => "SRTM15Plus",
            DemType::Nasadem => "NASADEM",
            DemType::Cop30 => "COP30",
            DemType::Cop90 => "COP90",
            DemType::EuDtm => "EU_DTM",
            DemType::GediL3 => "GEDI_L3",
            DemType::GebcoIceTopo => "GEBCOIceTopo",
            DemType::GebcoSubIceTopo => "GEBCOSubIceTopo",
        }
    }
}

impl fmt::Display for DemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DemType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown DEM type: {}", s))
    }
}

/// Immutable download configuration, built once at start-up.
#[derive(Clone)]
pub struct DownloadConfig {
    /// Service URL, without query string.
    pub endpoint: String,
    /// DEM product to request.
    pub dem_type: DemType,
    /// Request timeout; `None` keeps the HTTP client's default.
    pub timeout_secs: Option<u64>,
    api_key: String,
}

impl fmt::Debug for DownloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadConfig")
            .field("endpoint", &self.endpoint)
            .field("dem_type", &self.dem_type)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl DownloadConfig {
    /// Configuration for the default endpoint and product with the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            dem_type: DemType::default(),
            timeout_secs: None,
            api_key: api_key.into(),
        }
    }

    /// Read the configuration from `DEMALIGN_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`AlignError::Config`] if the API key is missing or empty, or
    /// if the DEM type or timeout cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(ENV_API_KEY)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AlignError::Config(format!("{} is not set", ENV_API_KEY)))?;

        let mut config = Self::new(api_key);
        if let Some(dem_type) = lookup(ENV_DEM_TYPE) {
            config.dem_type = dem_type
                .parse()
                .map_err(|e| AlignError::Config(format!("{}: {}", ENV_DEM_TYPE, e)))?;
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            config.endpoint = endpoint;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
            let secs = timeout.trim().parse().map_err(|_| {
                AlignError::Config(format!("{}: invalid number '{}'", ENV_TIMEOUT_SECS, timeout))
            })?;
            config.timeout_secs = Some(secs);
        }
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_dem_type(mut self, dem_type: DemType) -> Self {
        self.dem_type = dem_type;
        self
    }

    /// Set the request timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// The configured API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

/// Downloads reference DEMs from the terrain service.
pub struct Downloader {
    client: Client,
    config: DownloadConfig,
}

impl Downloader {
    /// Create a new downloader with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AlignError::Config`] if the HTTP client cannot be built.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| AlignError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Request URL for `bounds`, including the API key.
    pub fn request_url(&self, bounds: &Bounds) -> Result<Url> {
        self.build_url(bounds, &self.config.api_key)
    }

    fn build_url(&self, bounds: &Bounds, api_key: &str) -> Result<Url> {
        let params = [
            ("demtype", self.config.dem_type.as_str().to_string()),
            ("south", bounds.south.to_string()),
            ("north", bounds.north.to_string()),
            ("west", bounds.west.to_string()),
            ("east", bounds.east.to_string()),
            ("outputFormat", OUTPUT_FORMAT.to_string()),
            ("API_Key", api_key.to_string()),
        ];
        Url::parse_with_params(&self.config.endpoint, &params).map_err(|e| {
            AlignError::Config(format!("invalid endpoint '{}': {}", self.config.endpoint, e))
        })
    }

    /// Download the DEM covering `bounds` to `dest`.
    ///
    /// The body is written only after it has been received in full; nothing
    /// is written on failure. Returns the number of bytes saved.
    pub fn download(&self, bounds: &Bounds, dest: &Path) -> Result<u64> {
        let url = self.request_url(bounds)?;
        if let Ok(redacted) = self.build_url(bounds, "REDACTED") {
            debug!(url = %redacted, "requesting reference DEM");
        }
        info!(dem_type = %self.config.dem_type, %bounds, "downloading reference DEM");

        let response = self.client.get(url).send().map_err(network_error)?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
            return Err(AlignError::RemoteService {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().map_err(network_error)?;

        if let Err(source) = fs::write(dest, &bytes) {
            if dest.exists() {
                if let Err(e) = fs::remove_file(dest) {
                    warn!(path = %dest.display(), error = %e, "could not remove partial DEM");
                }
            }
            return Err(AlignError::DemWrite {
                path: dest.to_path_buf(),
                source,
            });
        }

        info!(path = %dest.display(), bytes = bytes.len(), "reference DEM saved");
        Ok(bytes.len() as u64)
    }
}

impl DemSource for Downloader {
    fn fetch(&self, bounds: &Bounds, dest: &Path) -> Result<()> {
        self.download(bounds, dest).map(|_| ())
    }
}

/// Transport errors never carry the URL, which contains the API key.
fn network_error(err: reqwest::Error) -> AlignError {
    AlignError::Network {
        reason: err.without_url().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use tempfile::TempDir;

    /// Serve exactly one HTTP response and return the request target.
    fn one_shot_server(status: &str, body: &'static [u8]) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/API/globaldem", listener.local_addr().unwrap());
        let status = status.to_string();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let header = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
            stream.flush().unwrap();
            request_line
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string()
        });

        (endpoint, handle)
    }

    fn query_of(target: &str) -> HashMap<String, String> {
        let url = Url::parse(&format!("http://localhost{}", target)).unwrap();
        url.query_pairs().into_owned().collect()
    }

    fn bounds() -> Bounds {
        Bounds::new(10.0, 45.0, 10.1, 45.1)
    }

    #[test]
    fn test_dem_type_parsing() {
        assert_eq!("aw3d30".parse::<DemType>().unwrap(), DemType::Aw3d30);
        assert_eq!("SRTMGL1_E".parse::<DemType>().unwrap(), DemType::Srtmgl1E);
        assert_eq!("cop30".parse::<DemType>().unwrap(), DemType::Cop30);
        assert!("ASTER".parse::<DemType>().is_err());
        for t in DemType::ALL {
            assert_eq!(t.as_str().parse::<DemType>().unwrap(), t);
        }
        assert_eq!(DemType::default().as_str(), "AW3D30");
    }

    #[test]
    fn test_request_url_parameters() {
        let config = DownloadConfig::new("secret")
            .with_endpoint("https://example.com/API/globaldem")
            .with_dem_type(DemType::Srtmgl1);
        let downloader = Downloader::new(config).unwrap();
        let url = downloader.request_url(&bounds()).unwrap();

        assert_eq!(url.path(), "/API/globaldem");
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["demtype"], "SRTMGL1");
        assert_eq!(query["south"], "45");
        assert_eq!(query["north"], "45.1");
        assert_eq!(query["west"], "10");
        assert_eq!(query["east"], "10.1");
        assert_eq!(query["outputFormat"], "GTiff");
        assert_eq!(query["API_Key"], "secret");
    }

    #[test]
    fn test_invalid_endpoint() {
        let downloader = Downloader::new(DownloadConfig::new("k").with_endpoint("not a url")).unwrap();
        let err = downloader.request_url(&bounds()).unwrap_err();
        assert!(matches!(err, AlignError::Config(_)));
    }

    #[test]
    fn test_config_debug_hides_key() {
        let config = DownloadConfig::new("super-secret-key").with_timeout(30);
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("redacted"));
        assert_eq!(config.timeout_secs, Some(30));
        assert_eq!(config.api_key(), "super-secret-key");
    }

    #[test]
    fn test_config_from_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "abc"),
            (ENV_DEM_TYPE, "cop90"),
            (ENV_TIMEOUT_SECS, "120"),
        ]
        .into_iter()
        .collect();
        let config =
            DownloadConfig::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api_key(), "abc");
        assert_eq!(config.dem_type, DemType::Cop90);
        assert_eq!(config.timeout_secs, Some(120));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_config_requires_api_key() {
        let err = DownloadConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, AlignError::Config(_)));
        assert_eq!(err.outcome().exit_code(), 1);

        let err = DownloadConfig::from_lookup(|name| {
            (name == ENV_API_KEY).then(|| "  ".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_API_KEY));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let bad_type = DownloadConfig::from_lookup(|name| match name {
            ENV_API_KEY => Some("k".to_string()),
            ENV_DEM_TYPE => Some("nope".to_string()),
            _ => None,
        });
        assert!(bad_type.is_err());

        let bad_timeout = DownloadConfig::from_lookup(|name| match name {
            ENV_API_KEY => Some("k".to_string()),
            ENV_TIMEOUT_SECS => Some("soon".to_string()),
            _ => None,
        });
        assert!(bad_timeout.is_err());
    }

    #[test]
    fn test_download_success_writes_body() {
        let (endpoint, server) = one_shot_server("200 OK", b"II*\0fake-geotiff");
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dem.tif");

        let downloader = Downloader::new(DownloadConfig::new("key123").with_endpoint(endpoint)).unwrap();
        let written = downloader.download(&bounds(), &dest).unwrap();

        assert_eq!(written, 16);
        assert_eq!(fs::read(&dest).unwrap(), b"II*\0fake-geotiff");

        let query = query_of(&server.join().unwrap());
        assert_eq!(query["demtype"], "AW3D30");
        assert_eq!(query["south"], "45");
        assert_eq!(query["east"], "10.1");
        assert_eq!(query["API_Key"], "key123");
    }

    #[test]
    fn test_download_service_error_surfaces_body() {
        let (endpoint, server) = one_shot_server("503 Service Unavailable", b"Server busy, try later");
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dem.tif");

        let downloader = Downloader::new(DownloadConfig::new("key").with_endpoint(endpoint)).unwrap();
        let err = downloader.fetch(&bounds(), &dest).unwrap_err();
        server.join().unwrap();

        match &err {
            AlignError::RemoteService { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "Server busy, try later");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.outcome().exit_code(), 3);
        assert!(!dest.exists());
    }

    #[test]
    fn test_download_accepted_is_not_a_dem() {
        let (endpoint, server) = one_shot_server("202 Accepted", b"job queued");
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dem.tif");

        let downloader = Downloader::new(DownloadConfig::new("key").with_endpoint(endpoint)).unwrap();
        let err = downloader.download(&bounds(), &dest).unwrap_err();
        server.join().unwrap();

        match &err {
            AlignError::RemoteService { status, body } => {
                assert_eq!(*status, 202);
                assert_eq!(body, "job queued");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.outcome().exit_code(), 3);
        assert!(!dest.exists());
    }

    #[test]
    fn test_download_connection_refused() {
        // Bind and drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let endpoint = format!("http://127.0.0.1:{}/API/globaldem", port);
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dem.tif");

        let downloader = Downloader::new(DownloadConfig::new("key").with_endpoint(endpoint)).unwrap();
        let err = downloader.download(&bounds(), &dest).unwrap_err();
        assert!(matches!(err, AlignError::Network { .. }));
        assert!(!err.to_string().contains("API_Key"));
        assert!(!dest.exists());
    }

    #[test]
    fn test_download_unwritable_destination() {
        let (endpoint, server) = one_shot_server("200 OK", b"II*\0");
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing-dir").join("dem.tif");

        let downloader = Downloader::new(DownloadConfig::new("key").with_endpoint(endpoint)).unwrap();
        let err = downloader.download(&bounds(), &dest).unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, AlignError::DemWrite { .. }));
        assert_eq!(err.outcome().exit_code(), 3);
    }
}
