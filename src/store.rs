//! Object storage for input data and output artifacts.
//!
//! A [Location] is either a local path or an object in an S3 bucket. The [Store] trait reads and
//! writes whole objects at a location.

use std::fmt::Display;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use expanduser::expanduser;
use hashbrown::HashMap;
use mime::Mime;
use tokio::sync::RwLock;
use url::Url;

use crate::error::ReductionError;
use crate::s3_client::S3Client;

/// Where an object lives.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Location {
    /// A local filesystem path
    Local(PathBuf),
    /// An object in an S3 bucket. The key may be empty, denoting the bucket root.
    S3 { bucket: String, key: String },
}

impl Location {
    /// Parse a location.
    ///
    /// `s3://` and `s3a://` URLs refer to S3 objects, `file://` URLs and anything else to local
    /// paths. A leading `~` in a local path is expanded.
    pub fn parse(location: &str) -> Result<Self, ReductionError> {
        let invalid = |reason| ReductionError::InvalidLocation {
            location: location.to_string(),
            reason,
        };
        if let Some((scheme, _)) = location.split_once("://") {
            let url = Url::parse(location).map_err(|_| invalid("not a valid URL"))?;
            return match scheme {
                "s3" | "s3a" => {
                    let bucket = url.host_str().ok_or_else(|| invalid("missing bucket"))?;
                    Ok(Location::S3 {
                        bucket: bucket.to_string(),
                        key: url.path().trim_start_matches('/').to_string(),
                    })
                }
                "file" => url
                    .to_file_path()
                    .map(Location::Local)
                    .map_err(|_| invalid("not a valid file URL")),
                _ => Err(invalid("unsupported URL scheme")),
            };
        }
        if location.is_empty() {
            return Err(invalid("empty path"));
        }
        let path = expanduser(location).map_err(|_| invalid("cannot expand user directory"))?;
        Ok(Location::Local(path))
    }

    /// Resolve the artifact store identifier and subfolder to a location.
    ///
    /// The identifier names an S3 bucket, unless it looks like a local directory: it contains a
    /// `/`, starts with `.` or `~`, or is a `file://` URL.
    pub fn artifact_root(identifier: &str, subfolder: &str) -> Result<Self, ReductionError> {
        let is_local = identifier.contains('/') || identifier.starts_with('.') || identifier.starts_with('~');
        if is_local {
            Ok(Location::parse(identifier)?.join(subfolder))
        } else if identifier.is_empty() {
            Err(ReductionError::InvalidLocation {
                location: identifier.to_string(),
                reason: "empty bucket name",
            })
        } else {
            Ok(Location::S3 {
                bucket: identifier.to_string(),
                key: subfolder.trim_matches('/').to_string(),
            })
        }
    }

    /// Append a path segment. Empty segments are ignored.
    pub fn join(&self, name: &str) -> Self {
        let name = name.trim_matches('/');
        match self {
            _ if name.is_empty() => self.clone(),
            Location::Local(path) => Location::Local(path.join(name)),
            Location::S3 { bucket, key } => {
                let key = key.trim_end_matches('/');
                Location::S3 {
                    bucket: bucket.clone(),
                    key: if key.is_empty() {
                        name.to_string()
                    } else {
                        format!("{}/{}", key, name)
                    },
                }
            }
        }
    }

    /// Final segment of the location.
    pub fn name(&self) -> String {
        match self {
            Location::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Location::S3 { key, .. } => key.rsplit('/').next().unwrap_or_default().to_string(),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

/// Reads and writes whole objects.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read an object.
    async fn get(&self, location: &Location) -> Result<Bytes, ReductionError>;

    /// Write an object, replacing any existing object at the location.
    async fn put(&self, location: &Location, data: Bytes, content_type: &Mime) -> Result<(), ReductionError>;
}

fn unsupported(location: &Location, reason: &'static str) -> ReductionError {
    ReductionError::InvalidLocation {
        location: location.to_string(),
        reason,
    }
}

/// Store backed by the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalStore;

#[async_trait]
impl Store for LocalStore {
    async fn get(&self, location: &Location) -> Result<Bytes, ReductionError> {
        let Location::Local(path) = location else {
            return Err(unsupported(location, "not a local path"));
        };
        match tokio::fs::read(path).await {
            Ok(data) => Ok(data.into()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ReductionError::NotFound {
                location: location.to_string(),
            }),
            Err(source) => Err(ReductionError::LocalIo {
                path: location.to_string(),
                source,
            }),
        }
    }

    async fn put(&self, location: &Location, data: Bytes, _content_type: &Mime) -> Result<(), ReductionError> {
        let Location::Local(path) = location else {
            return Err(unsupported(location, "not a local path"));
        };
        let local_io = |source| ReductionError::LocalIo {
            path: location.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(local_io)?;
        }
        tokio::fs::write(path, data).await.map_err(local_io)
    }
}

/// Store backed by S3 object storage.
#[derive(Clone)]
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    pub fn new(client: S3Client) -> Self {
        S3Store { client }
    }
}

#[async_trait]
impl Store for S3Store {
    async fn get(&self, location: &Location) -> Result<Bytes, ReductionError> {
        match location {
            Location::S3 { bucket, key } if !key.is_empty() => self.client.download_object(bucket, key).await,
            _ => Err(unsupported(location, "not an S3 object")),
        }
    }

    async fn put(&self, location: &Location, data: Bytes, content_type: &Mime) -> Result<(), ReductionError> {
        match location {
            Location::S3 { bucket, key } if !key.is_empty() => {
                self.client
                    .upload_object(bucket, key, data, content_type)
                    .await
            }
            _ => Err(unsupported(location, "not an S3 object")),
        }
    }
}

/// Dispatches to a local or S3 store according to the location.
pub struct StoreRouter {
    local: LocalStore,
    s3: S3Store,
}

impl StoreRouter {
    pub fn new(s3: S3Store) -> Self {
        StoreRouter {
            local: LocalStore,
            s3,
        }
    }

    fn route(&self, location: &Location) -> &dyn Store {
        match location {
            Location::Local(_) => &self.local,
            Location::S3 { .. } => &self.s3,
        }
    }
}

#[async_trait]
impl Store for StoreRouter {
    async fn get(&self, location: &Location) -> Result<Bytes, ReductionError> {
        self.route(location).get(location).await
    }

    async fn put(&self, location: &Location, data: Bytes, content_type: &Mime) -> Result<(), ReductionError> {
        self.route(location).put(location, data, content_type).await
    }
}

/// Store held in memory, for any kind of location.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<Location, (Bytes, Mime)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type of a stored object.
    pub async fn content_type(&self, location: &Location) -> Option<Mime> {
        self.objects
            .read()
            .await
            .get(location)
            .map(|(_, content_type)| content_type.clone())
    }

    /// Locations of all stored objects.
    pub async fn locations(&self) -> Vec<Location> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, location: &Location) -> Result<Bytes, ReductionError> {
        self.objects
            .read()
            .await
            .get(location)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| ReductionError::NotFound {
                location: location.to_string(),
            })
    }

    async fn put(&self, location: &Location, data: Bytes, content_type: &Mime) -> Result<(), ReductionError> {
        self.objects
            .write()
            .await
            .insert(location.clone(), (data, content_type.clone()));
        Ok(())
    }
}
