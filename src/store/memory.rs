use anyhow::Context;
use chrono::{Duration, Utc};
use itertools::Itertools;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Cursor, Write};

use crate::logic::log_resolver::DEFAULT_REGISTRY_REMOTE;
use crate::model::{
    DatasetRef, Format, ImageData, ListParams, ProfileImage, SaveRequest, Upload, VersionInfo,
    ORDER_BY_NAME,
};
use crate::store::traits::{
    DatasetStore, LogStore, ProfileStore, Publisher, RemoteFetcher, SqlEngine, StoreError,
    StoreResult,
};

type DatasetKey = (String, String);

/// Smallest valid PNG, served for seeded profile images
const PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// One stored version of a dataset
#[derive(Debug, Clone)]
struct Snapshot {
    info: VersionInfo,
    meta: Value,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Snapshot {
    fn body_objects(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                Value::Object(object)
            })
            .collect()
    }

    /// Dataset document without its body
    fn header(&self) -> Value {
        json!({
            "username": self.info.username,
            "name": self.info.name,
            "path": self.info.path,
            "commit": {
                "title": self.info.commit_title,
                "message": self.info.commit_message,
                "timestamp": self.info.commit_time.to_rfc3339(),
            },
            "meta": self.meta,
            "structure": {
                "format": "csv",
                "columns": self.columns,
                "entries": self.rows.len(),
            },
        })
    }

    fn document(&self) -> Value {
        let mut document = self.header();
        if let Value::Object(object) = &mut document {
            object.insert("body".to_string(), Value::Array(self.body_objects()));
        }
        document
    }

    fn body_csv(&self, limit: Option<usize>) -> StoreResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .context("writing csv header")?;
        for row in self.rows.iter().take(limit.unwrap_or(usize::MAX)) {
            writer
                .write_record(row.iter().map(cell_text))
                .context("writing csv row")?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("flushing csv: {}", err.error()))?;
        Ok(bytes)
    }
}

#[derive(Debug, Clone)]
struct Profile {
    id: String,
    peername: String,
    photo: ImageData,
    poster: ImageData,
}

/// Instance that keeps every dataset, remote and profile in memory.
///
/// Local histories are stored newest first. A key with an empty history is a
/// dataset that was initialised but never committed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: RwLock<HashMap<DatasetKey, Vec<Snapshot>>>,
    remotes: RwLock<HashMap<String, HashMap<DatasetKey, Vec<VersionInfo>>>>,
    profiles: RwLock<Vec<Profile>>,
}

impl MemoryStore {
    /// Empty store that knows the default registry
    pub fn new() -> Self {
        let store = Self::default();
        store.add_remote(DEFAULT_REGISTRY_REMOTE);
        store
    }

    /// Store with demonstration data:
    /// - `peer/movies`, three local versions
    /// - `peer/empty`, a dataset without versions
    /// - `registry_peer/census`, 30 versions held only by the registry
    /// - `registry_peer/census`, 3 versions on the `archive` remote
    /// - a profile for `peer`
    pub fn seeded() -> Self {
        let store = Self::new();
        store.add_remote("archive");

        let columns = vec!["title".to_string(), "year".to_string(), "rating".to_string()];
        let all_rows = vec![
            vec![json!("Metropolis"), json!(1927), json!(8.3)],
            vec![json!("Stalker"), json!(1979), json!(8.1)],
            vec![json!("Alien"), json!(1979), json!(8.5)],
            vec![json!("Heat"), json!(1995), json!(8.3)],
            vec![json!("Arrival"), json!(2016), json!(7.9)],
        ];
        let history = (0..3)
            .map(|i| {
                let rows = all_rows[..all_rows.len() - i].to_vec();
                let mut info = seed_version("peer", "movies", i);
                info.body_rows = rows.len();
                info.body_size = rows.len() * 24;
                Snapshot {
                    info,
                    meta: json!({"title": "Movies", "description": "Films worth a rewatch"}),
                    columns: columns.clone(),
                    rows,
                }
            })
            .collect();

        {
            let mut datasets = store.datasets.write();
            datasets.insert(key("peer", "movies"), history);
            datasets.insert(key("peer", "empty"), Vec::new());
        }
        {
            let mut remotes = store.remotes.write();
            let census: Vec<VersionInfo> = (0..30)
                .map(|i| remote_version(seed_version("registry_peer", "census", i)))
                .collect();
            if let Some(registry) = remotes.get_mut(DEFAULT_REGISTRY_REMOTE) {
                registry.insert(key("registry_peer", "census"), census.clone());
            }
            if let Some(archive) = remotes.get_mut("archive") {
                archive.insert(
                    key("registry_peer", "census"),
                    census.into_iter().take(3).collect(),
                );
            }
        }
        store.profiles.write().push(Profile {
            id: uuid::Uuid::new_v4().to_string(),
            peername: "peer".to_string(),
            photo: png(),
            poster: png(),
        });

        store
    }

    /// Make a remote known to the store; existing histories are kept
    pub fn add_remote(&self, name: &str) {
        self.remotes.write().entry(name.to_string()).or_default();
    }

    /// Find one version: the one at `reference.path`, or the latest
    fn snapshot(&self, reference: &DatasetRef) -> StoreResult<Snapshot> {
        let datasets = self.datasets.read();
        let history = datasets
            .get(&key(&reference.username, &reference.name))
            .ok_or_else(|| StoreError::NotFound(reference.alias()))?;
        let snapshot = match &reference.path {
            Some(path) => history.iter().find(|s| &s.info.path == path),
            None => history.first(),
        };
        snapshot
            .cloned()
            .ok_or_else(|| StoreError::NotFound(reference.to_string()))
    }
}

#[async_trait::async_trait]
impl LogStore for MemoryStore {
    async fn log(&self, reference: &DatasetRef, params: &ListParams) -> StoreResult<Vec<VersionInfo>> {
        let datasets = self.datasets.read();
        let history = datasets
            .get(&key(&reference.username, &reference.name))
            .ok_or_else(|| StoreError::NotFound(reference.alias()))?;
        if history.is_empty() {
            return Err(StoreError::NoHistory(reference.alias()));
        }

        let start = match &reference.path {
            Some(path) => history
                .iter()
                .position(|s| &s.info.path == path)
                .ok_or_else(|| StoreError::NotFound(reference.to_string()))?,
            None => 0,
        };
        Ok(history[start..]
            .iter()
            .skip(params.offset)
            .take(params.limit)
            .map(|s| s.info.clone())
            .collect())
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for MemoryStore {
    async fn fetch(&self, reference: &DatasetRef, remote: &str) -> StoreResult<Vec<VersionInfo>> {
        let remote = remote_name(remote);
        let remotes = self.remotes.read();
        let histories = remotes
            .get(remote)
            .ok_or_else(|| StoreError::Upstream(format!("unknown remote \"{}\"", remote)))?;
        histories
            .get(&key(&reference.username, &reference.name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} on {}", reference.alias(), remote)))
    }
}

#[async_trait::async_trait]
impl SqlEngine for MemoryStore {
    async fn exec(&self, query: &str, format: Format) -> StoreResult<Vec<u8>> {
        let (reference, limit) = parse_select(query)?;
        let snapshot = self.snapshot(&reference)?;

        match format {
            Format::Json => {
                let rows: Vec<Value> = snapshot
                    .body_objects()
                    .into_iter()
                    .take(limit.unwrap_or(usize::MAX))
                    .collect();
                Ok(serde_json::to_vec(&rows).context("encoding query result")?)
            }
            Format::Csv => snapshot.body_csv(limit),
            Format::Zip => Err(StoreError::Invalid(
                "query results cannot be rendered as zip".to_string(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl DatasetStore for MemoryStore {
    async fn get(&self, reference: &DatasetRef, format: Format) -> StoreResult<Vec<u8>> {
        let snapshot = self.snapshot(reference)?;

        match (format, reference.selector.as_deref()) {
            (Format::Zip, None) => zip_archive(&snapshot),
            (Format::Zip, Some(_)) => Err(StoreError::Invalid(
                "zip exports cannot address a selector".to_string(),
            )),
            (Format::Csv, None | Some("body")) => snapshot.body_csv(None),
            (Format::Csv, Some(selector)) => Err(StoreError::Invalid(format!(
                "selector \"{}\" cannot be rendered as csv",
                selector
            ))),
            (Format::Json, None) => {
                Ok(serde_json::to_vec(&snapshot.document()).context("encoding dataset")?)
            }
            (Format::Json, Some(selector)) => {
                let document = snapshot.document();
                let value = select(&document, selector).ok_or_else(|| {
                    StoreError::NotFound(format!(
                        "selector \"{}\" of {}",
                        selector,
                        reference.alias()
                    ))
                })?;
                Ok(serde_json::to_vec(value).context("encoding selection")?)
            }
        }
    }

    async fn list(&self, params: &ListParams) -> StoreResult<Vec<VersionInfo>> {
        let datasets = self.datasets.read();
        let latest = datasets
            .values()
            .filter_map(|history| history.first())
            .map(|s| &s.info)
            .filter(|info| {
                params
                    .peername
                    .as_deref()
                    .map_or(true, |peername| info.username == peername)
            })
            .filter(|info| params.published.map_or(true, |p| info.published == p));

        let ordered: Vec<&VersionInfo> = if params.order_by.as_deref() == Some(ORDER_BY_NAME) {
            latest
                .sorted_by(|a, b| (&a.username, &a.name).cmp(&(&b.username, &b.name)))
                .collect()
        } else {
            latest
                .sorted_by(|a, b| b.commit_time.cmp(&a.commit_time))
                .collect()
        };

        Ok(ordered
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .cloned()
            .collect())
    }

    async fn save(&self, reference: &DatasetRef, request: SaveRequest) -> StoreResult<VersionInfo> {
        let profile_id = self
            .profiles
            .read()
            .iter()
            .find(|profile| profile.peername == reference.username)
            .map(|profile| profile.id.clone());

        let dataset_key = key(&reference.username, &reference.name);
        let mut datasets = self.datasets.write();
        let previous = datasets
            .get(&dataset_key)
            .and_then(|history| history.first())
            .cloned();
        let previous = previous.as_ref();

        let (columns, rows, body_size) = match (&request.body, previous) {
            (Some(body), _) => {
                let (columns, rows) = parse_body(body)?;
                (columns, rows, body.bytes.len())
            }
            (None, Some(previous)) => (
                previous.columns.clone(),
                previous.rows.clone(),
                previous.info.body_size,
            ),
            (None, None) => {
                return Err(StoreError::Invalid(format!(
                    "{} has no versions yet, a body is required",
                    reference.alias()
                )))
            }
        };

        let mut hasher = Sha256::new();
        hasher.update(reference.alias().as_bytes());
        if let Some(previous) = previous {
            hasher.update(previous.info.path.as_bytes());
        }
        if let Some(body) = &request.body {
            hasher.update(&body.bytes);
        }
        hasher.update(Utc::now().to_rfc3339().as_bytes());
        let path = format!("/mem/{}", hex::encode(hasher.finalize()));

        let title = request.title.unwrap_or_else(|| {
            if previous.is_some() {
                "updated dataset".to_string()
            } else {
                "created dataset".to_string()
            }
        });
        let meta = previous
            .map(|previous| previous.meta.clone())
            .unwrap_or_else(|| json!({"title": reference.name}));
        let published = previous.is_some_and(|previous| previous.info.published);

        let info = VersionInfo {
            username: reference.username.clone(),
            name: reference.name.clone(),
            path,
            profile_id,
            commit_time: Utc::now(),
            commit_title: title,
            commit_message: request.message,
            body_rows: rows.len(),
            body_size,
            published,
            foreign: false,
        };
        datasets.entry(dataset_key).or_default().insert(
            0,
            Snapshot {
                info: info.clone(),
                meta,
                columns,
                rows,
            },
        );
        log::info!("saved {} at {}", reference.alias(), info.path);

        Ok(info)
    }
}

#[async_trait::async_trait]
impl Publisher for MemoryStore {
    async fn publish(&self, reference: &DatasetRef, remote: &str) -> StoreResult<VersionInfo> {
        let remote = remote_name(remote);
        let dataset_key = key(&reference.username, &reference.name);

        let mut datasets = self.datasets.write();
        let history = datasets
            .get_mut(&dataset_key)
            .ok_or_else(|| StoreError::NotFound(reference.alias()))?;
        if history.is_empty() {
            return Err(StoreError::NoHistory(reference.alias()));
        }

        let mut remotes = self.remotes.write();
        let histories = remotes
            .get_mut(remote)
            .ok_or_else(|| StoreError::Upstream(format!("unknown remote \"{}\"", remote)))?;

        for snapshot in history.iter_mut() {
            snapshot.info.published = true;
        }
        histories.insert(
            dataset_key,
            history
                .iter()
                .map(|s| remote_version(s.info.clone()))
                .collect(),
        );

        Ok(history[0].info.clone())
    }

    async fn unpublish(&self, reference: &DatasetRef, remote: &str) -> StoreResult<VersionInfo> {
        let remote = remote_name(remote);
        let dataset_key = key(&reference.username, &reference.name);

        let mut datasets = self.datasets.write();
        let history = datasets
            .get_mut(&dataset_key)
            .filter(|history| !history.is_empty())
            .ok_or_else(|| StoreError::NotFound(reference.alias()))?;

        let mut remotes = self.remotes.write();
        let histories = remotes
            .get_mut(remote)
            .ok_or_else(|| StoreError::Upstream(format!("unknown remote \"{}\"", remote)))?;
        if histories.remove(&dataset_key).is_none() {
            return Err(StoreError::NotFound(format!(
                "{} on {}",
                reference.alias(),
                remote
            )));
        }

        for snapshot in history.iter_mut() {
            snapshot.info.published = false;
        }
        Ok(history[0].info.clone())
    }
}

#[async_trait::async_trait]
impl ProfileStore for MemoryStore {
    async fn image(
        &self,
        kind: ProfileImage,
        peername: Option<&str>,
        id: Option<&str>,
    ) -> StoreResult<ImageData> {
        let profiles = self.profiles.read();
        let profile = profiles
            .iter()
            .find(|profile| {
                peername.map_or(true, |p| profile.peername == p) && id.map_or(true, |i| profile.id == i)
            })
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "profile {}",
                    peername.or(id).unwrap_or_default()
                ))
            })?;

        Ok(match kind {
            ProfileImage::Photo => profile.photo.clone(),
            ProfileImage::Poster => profile.poster.clone(),
        })
    }
}

fn key(username: &str, name: &str) -> DatasetKey {
    (username.to_string(), name.to_string())
}

/// `""` names the default registry
fn remote_name(remote: &str) -> &str {
    if remote.is_empty() {
        DEFAULT_REGISTRY_REMOTE
    } else {
        remote
    }
}

fn remote_version(mut info: VersionInfo) -> VersionInfo {
    info.foreign = true;
    info.published = true;
    info
}

fn seed_version(username: &str, name: &str, age: usize) -> VersionInfo {
    let digest = Sha256::digest(format!("{}/{}#{}", username, name, age).as_bytes());
    VersionInfo {
        username: username.to_string(),
        name: name.to_string(),
        path: format!("/mem/{}", hex::encode(digest)),
        profile_id: None,
        commit_time: Utc::now() - Duration::hours(age as i64),
        commit_title: format!("version {}", age),
        commit_message: None,
        body_rows: 0,
        body_size: 0,
        published: false,
        foreign: false,
    }
}

fn png() -> ImageData {
    ImageData {
        content_type: "image/png".to_string(),
        bytes: PIXEL_PNG.to_vec(),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Type a CSV cell the way a JSON body would carry it
fn cell_value(text: &str) -> Value {
    if let Ok(n) = text.parse::<i64>() {
        json!(n)
    } else if let Some(n) = text.parse::<f64>().ok().filter(|n| n.is_finite()) {
        json!(n)
    } else {
        Value::String(text.to_string())
    }
}

/// Walk a selector (`meta/title`, `meta.title`, `body/0`) into a document
fn select<'a>(document: &'a Value, selector: &str) -> Option<&'a Value> {
    selector
        .split(['/', '.'])
        .try_fold(document, |value, segment| match value {
            Value::Object(object) => object.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn parse_body(body: &Upload) -> StoreResult<(Vec<String>, Vec<Vec<Value>>)> {
    if body.is_csv() {
        return parse_csv(&body.bytes);
    }
    match serde_json::from_slice::<Value>(&body.bytes) {
        Ok(value) => parse_json_rows(value),
        // Untyped uploads that are not JSON are read as CSV
        Err(_) if body.content_type.is_none() => parse_csv(&body.bytes),
        Err(err) => Err(StoreError::Invalid(format!("body is not valid JSON: {}", err))),
    }
}

fn parse_csv(bytes: &[u8]) -> StoreResult<(Vec<String>, Vec<Vec<Value>>)> {
    let mut reader = csv::Reader::from_reader(bytes);
    let columns: Vec<String> = reader
        .headers()
        .map_err(|err| StoreError::Invalid(format!("invalid csv body: {}", err)))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| StoreError::Invalid(format!("invalid csv body: {}", err)))?;
        rows.push(record.iter().map(cell_value).collect());
    }
    Ok((columns, rows))
}

fn parse_json_rows(value: Value) -> StoreResult<(Vec<String>, Vec<Vec<Value>>)> {
    let Value::Array(items) = value else {
        return Err(StoreError::Invalid("JSON body must be an array of rows".to_string()));
    };

    match items.first() {
        Some(Value::Object(first)) => {
            let columns: Vec<String> = first.keys().cloned().collect();
            let rows = items
                .iter()
                .map(|item| match item {
                    Value::Object(object) => Ok(columns
                        .iter()
                        .map(|column| object.get(column).cloned().unwrap_or(Value::Null))
                        .collect()),
                    _ => Err(StoreError::Invalid(
                        "JSON rows must all be objects or all be arrays".to_string(),
                    )),
                })
                .collect::<StoreResult<Vec<Vec<Value>>>>()?;
            Ok((columns, rows))
        }
        Some(Value::Array(first)) => {
            let columns = (1..=first.len()).map(|i| format!("field_{}", i)).collect();
            let rows = items
                .into_iter()
                .map(|item| match item {
                    Value::Array(cells) => Ok(cells),
                    _ => Err(StoreError::Invalid(
                        "JSON rows must all be objects or all be arrays".to_string(),
                    )),
                })
                .collect::<StoreResult<Vec<Vec<Value>>>>()?;
            Ok((columns, rows))
        }
        Some(_) => Err(StoreError::Invalid(
            "JSON rows must be objects or arrays".to_string(),
        )),
        None => Ok((Vec::new(), Vec::new())),
    }
}

/// `SELECT * FROM username/name [LIMIT n]`, keywords case-insensitive
fn parse_select(query: &str) -> StoreResult<(DatasetRef, Option<usize>)> {
    let unsupported = || {
        StoreError::Invalid(
            "unsupported query, expected SELECT * FROM username/name [LIMIT n]".to_string(),
        )
    };
    let tokens: Vec<&str> = query
        .trim()
        .trim_end_matches(';')
        .split_whitespace()
        .collect();

    let (table, limit) = match tokens.as_slice() {
        [select, "*", from, table] if is_keyword(select, "select") && is_keyword(from, "from") => {
            (*table, None)
        }
        [select, "*", from, table, limit_kw, n]
            if is_keyword(select, "select")
                && is_keyword(from, "from")
                && is_keyword(limit_kw, "limit") =>
        {
            let n = n.parse::<usize>().map_err(|_| unsupported())?;
            (*table, Some(n))
        }
        _ => return Err(unsupported()),
    };

    let reference = DatasetRef::parse(table)
        .map_err(|err| StoreError::Invalid(format!("invalid table \"{}\": {}", table, err)))?;
    if !reference.has_name() {
        return Err(unsupported());
    }
    Ok((reference, limit))
}

fn is_keyword(token: &str, keyword: &str) -> bool {
    token.eq_ignore_ascii_case(keyword)
}

fn zip_archive(snapshot: &Snapshot) -> StoreResult<Vec<u8>> {
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

    let header = serde_json::to_vec_pretty(&snapshot.header()).context("encoding dataset")?;
    writer
        .start_file("dataset.json", options)
        .context("starting dataset.json")?;
    writer.write_all(&header).context("writing dataset.json")?;

    let body = snapshot.body_csv(None)?;
    writer
        .start_file("body.csv", options)
        .context("starting body.csv")?;
    writer.write_all(&body).context("writing body.csv")?;

    let cursor = writer.finish().context("finishing archive")?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn movies() -> DatasetRef {
        DatasetRef::new("peer", "movies")
    }

    #[tokio::test]
    async fn test_log_distinguishes_missing_and_empty() {
        let store = MemoryStore::seeded();
        let params = ListParams::default();

        let history = store.log(&movies(), &params).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].commit_time > history[2].commit_time);

        let missing = store.log(&DatasetRef::new("peer", "nope"), &params).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));

        let empty = store.log(&DatasetRef::new("peer", "empty"), &params).await;
        assert!(matches!(empty, Err(StoreError::NoHistory(_))));
    }

    #[tokio::test]
    async fn test_log_from_version_path() {
        let store = MemoryStore::seeded();
        let history = store.log(&movies(), &ListParams::default()).await.unwrap();
        let reference = movies().with_path(history[1].path.clone());

        let older = store.log(&reference, &ListParams::default()).await.unwrap();
        assert_eq!(older.len(), 2);
        assert_eq!(older[0].path, history[1].path);
    }

    #[tokio::test]
    async fn test_fetch_default_registry_and_unknown_remote() {
        let store = MemoryStore::seeded();
        let census = DatasetRef::new("registry_peer", "census");

        let items = store.fetch(&census, "").await.unwrap();
        assert_eq!(items.len(), 30);
        assert!(items.iter().all(|item| item.foreign));

        assert_eq!(store.fetch(&census, "archive").await.unwrap().len(), 3);
        assert!(matches!(
            store.fetch(&census, "elsewhere").await,
            Err(StoreError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_sql_select() {
        let store = MemoryStore::seeded();
        let output = store
            .exec("select * from peer/movies limit 2;", Format::Json)
            .await
            .unwrap();
        let rows: Vec<Value> = serde_json::from_slice(&output).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], "Metropolis");

        let err = store.exec("DROP TABLE peer/movies", Format::Json).await;
        assert!(matches!(err, Err(StoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_get_selector_and_csv() {
        let store = MemoryStore::seeded();

        let title = store
            .get(&movies().with_selector("meta.title"), Format::Json)
            .await
            .unwrap();
        assert_eq!(title, br#""Movies""#.to_vec());

        let csv = store
            .get(&movies().with_selector("body"), Format::Csv)
            .await
            .unwrap();
        let text = String::from_utf8(csv).unwrap();
        assert!(text.starts_with("title,year,rating\n"));
        assert_eq!(text.lines().count(), 6);

        let missing = store
            .get(&movies().with_selector("viz"), Format::Json)
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_zip_export_contents() {
        let store = MemoryStore::seeded();
        let bytes = store.get(&movies(), Format::Zip).await.unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut body = String::new();
        archive
            .by_name("body.csv")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert!(body.starts_with("title,year,rating"));
        assert!(archive.by_name("dataset.json").is_ok());
    }

    #[tokio::test]
    async fn test_save_csv_then_list() {
        let store = MemoryStore::seeded();
        let reference = DatasetRef::new("peer", "birds");
        let request = SaveRequest {
            title: Some("first count".to_string()),
            message: None,
            body: Some(Upload {
                filename: Some("birds.csv".to_string()),
                content_type: None,
                bytes: b"species,count\nwren,3\nrobin,5\n".to_vec(),
            }),
        };

        let info = store.save(&reference, request).await.unwrap();
        assert_eq!(info.body_rows, 2);
        assert!(info.path.starts_with("/mem/"));
        assert!(info.profile_id.is_some());

        let params = ListParams {
            order_by: Some(ORDER_BY_NAME.to_string()),
            peername: Some("peer".to_string()),
            ..Default::default()
        };
        let listed = store.list(&params).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["birds", "movies"]);
    }

    #[tokio::test]
    async fn test_save_without_body_needs_history() {
        let store = MemoryStore::new();
        let result = store
            .save(&DatasetRef::new("peer", "new"), SaveRequest::default())
            .await;
        assert!(matches!(result, Err(StoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_publish_then_fetch_then_unpublish() {
        let store = MemoryStore::seeded();

        let info = store.publish(&movies(), "").await.unwrap();
        assert!(info.published);
        assert_eq!(store.fetch(&movies(), "").await.unwrap().len(), 3);

        let info = store.unpublish(&movies(), "").await.unwrap();
        assert!(!info.published);
        assert!(matches!(
            store.fetch(&movies(), "").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_profile_image_lookup() {
        let store = MemoryStore::seeded();
        let image = store
            .image(ProfileImage::Photo, Some("peer"), None)
            .await
            .unwrap();
        assert_eq!(image.content_type, "image/png");

        let missing = store.image(ProfileImage::Poster, Some("ghost"), None).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }
}
