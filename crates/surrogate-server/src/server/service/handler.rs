//! Routes:
//!
//! | Path | Query | 200 body |
//! |---|---|---|
//! | `/{kind}/id` | the kind's key fields, `release`, `create` | id |
//! | `/analysis/id` | `submittedAnalysisId` (optional), `create` (default `true`) | id |
//! | `/object/id` | `analysisId`, `fileName` | id |
//! | `/{kind}/export` | none | gzip TSV |
//!
//! A lookup without `create` that finds nothing is a 404. Store work runs on
//! the blocking pool.

use crate::server::{
    allocator::Allocator,
    error::{Error, Result},
    export::gzip_export,
    store::SqliteStore,
};
use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use surrogate::{Backing, BusinessKey, EntityKind, is_row_delimiter, object_id};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

type Params = HashMap<String, String>;

#[derive(Clone)]
pub struct AppState {
    allocator: Arc<Allocator<SqliteStore>>,
}

impl AppState {
    pub fn new(allocator: Allocator<SqliteStore>) -> Self {
        Self {
            allocator: Arc::new(allocator),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(EntityKind::Analysis.id_path(), get(analysis_id))
        .route(EntityKind::Object.id_path(), get(derived_object_id));

    for kind in EntityKind::SEQUENCED {
        router = router.route(
            kind.id_path(),
            get(move |State(state): State<AppState>, Query(params): Query<Params>| {
                entity_id(kind, state, params)
            }),
        );
    }

    for kind in EntityKind::ALL {
        if kind.backing() == Backing::Derived {
            continue;
        }
        router = router.route(
            &kind.export_path(),
            get(move |State(state): State<AppState>| export(kind, state)),
        );
    }

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Runs store work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| Error::Store(format!("store task failed: {err}")))?
}

fn create_flag(params: &Params) -> Result<bool> {
    match params.get("create").map(String::as_str) {
        None => Ok(false),
        Some(raw) => raw.parse().map_err(|_| Error::InvalidRequest {
            reason: format!("create must be true or false, got {raw:?}"),
        }),
    }
}

async fn entity_id(kind: EntityKind, state: AppState, params: Params) -> Result<String> {
    let create = create_flag(&params)?;
    let fields = kind
        .key_params()
        .iter()
        .map(|param| {
            params.get(*param).cloned().ok_or_else(|| Error::InvalidRequest {
                reason: format!("missing query parameter {param}"),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let key = BusinessKey::new(kind, fields)?;
    let release = params.get("release").cloned().unwrap_or_default();
    if release.contains(is_row_delimiter) {
        return Err(Error::InvalidRequest {
            reason: "release must not contain tabs or line breaks".to_string(),
        });
    }
    debug!(%kind, create, "Resolving id");

    let allocator = Arc::clone(&state.allocator);
    blocking(move || allocator.resolve(&key, &release, create))
        .await?
        .ok_or(Error::NotFound { kind })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisQuery {
    #[serde(default)]
    submitted_analysis_id: String,
    create: Option<bool>,
}

async fn analysis_id(
    State(state): State<AppState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<String> {
    let create = query.create.unwrap_or(true);
    debug!(create, random = query.submitted_analysis_id.is_empty(), "Resolving analysis id");

    let allocator = Arc::clone(&state.allocator);
    blocking(move || allocator.analysis_id(&query.submitted_analysis_id, create)).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectQuery {
    analysis_id: String,
    file_name: String,
}

async fn derived_object_id(Query(query): Query<ObjectQuery>) -> String {
    object_id(&query.analysis_id, &query.file_name)
}

async fn export(kind: EntityKind, state: AppState) -> Result<impl IntoResponse> {
    let allocator = Arc::clone(&state.allocator);
    let archive = blocking(move || gzip_export(allocator.store(), kind)).await?;
    Ok(([(header::CONTENT_TYPE, "application/gzip")], archive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use core::time::Duration;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use surrogate::validate_id;
    use tower::ServiceExt;

    fn app(dir: &tempfile::TempDir) -> Router {
        let store = SqliteStore::open(&dir.path().join("ids.db"), 2, Duration::from_secs(5)).unwrap();
        router(AppState::new(Allocator::new(store, 100, 10)))
    }

    async fn call(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn text(app: &Router, uri: &str) -> (StatusCode, String) {
        let (status, body) = call(app, uri).await;
        (status, String::from_utf8(body).unwrap())
    }

    #[tokio::test]
    async fn lookup_is_absent_until_created() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let uri = "/donor/id?submittedDonorId=S1&submittedProjectId=P1&release=ICGC22";

        assert_eq!(call(&app, uri).await.0, StatusCode::NOT_FOUND);
        assert_eq!(
            text(&app, &format!("{uri}&create=true")).await,
            (StatusCode::OK, "DO1".to_string())
        );
        assert_eq!(
            text(&app, &format!("{uri}&create=false")).await,
            (StatusCode::OK, "DO1".to_string())
        );
        assert_eq!(
            text(&app, "/donor/id?submittedDonorId=S2&submittedProjectId=P1&create=true").await,
            (StatusCode::OK, "DO2".to_string())
        );
    }

    #[tokio::test]
    async fn every_sequenced_kind_is_routed() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        for kind in EntityKind::SEQUENCED {
            let query: Vec<String> = kind.key_params().iter().map(|p| format!("{p}=x")).collect();
            let uri = format!("{}?{}&create=true", kind.id_path(), query.join("&"));
            let (status, id) = text(&app, &uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            validate_id(&id, kind).unwrap();
        }
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        for uri in [
            "/donor/id?submittedDonorId=S1",
            "/donor/id?submittedDonorId=S1&submittedProjectId=",
            "/file/id?submittedFileId=f&create=yes",
            "/object/id?analysisId=AN1",
        ] {
            assert_eq!(call(&app, uri).await.0, StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn row_delimiters_in_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        for uri in [
            "/donor/id?submittedDonorId=A%09B&submittedProjectId=P&create=true",
            "/donor/id?submittedDonorId=A&submittedProjectId=B%0AP&create=true",
            "/file/id?submittedFileId=f%0D&create=true",
            "/donor/id?submittedDonorId=A&submittedProjectId=P&release=R%09X&create=true",
        ] {
            assert_eq!(call(&app, uri).await.0, StatusCode::BAD_REQUEST, "{uri}");
        }

        let (status, body) = call(&app, "/donor/export").await;
        assert_eq!(status, StatusCode::OK);
        let mut tsv = String::new();
        GzDecoder::new(body.as_slice()).read_to_string(&mut tsv).unwrap();
        assert!(tsv.is_empty(), "{tsv:?}");
    }

    #[tokio::test]
    async fn object_ids_are_derived() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let (status, id) = text(&app, "/object/id?analysisId=AN1&fileName=reads.bam").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(id, object_id("AN1", "reads.bam"));
    }

    #[tokio::test]
    async fn analysis_ids() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let (status, random) = text(&app, "/analysis/id").await;
        assert_eq!(status, StatusCode::OK);
        validate_id(&random, EntityKind::Analysis).unwrap();
        assert_eq!(
            text(&app, &format!("/analysis/id?submittedAnalysisId={random}&create=false")).await,
            (StatusCode::OK, random)
        );

        assert_eq!(call(&app, "/analysis/id?create=false").await.0, StatusCode::BAD_REQUEST);
        assert_eq!(
            call(&app, "/analysis/id?submittedAnalysisId=AN1&create=false").await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            text(&app, "/analysis/id?submittedAnalysisId=AN1").await,
            (StatusCode::OK, "AN1".to_string())
        );
        assert_eq!(
            call(&app, "/analysis/id?submittedAnalysisId=bad%20id").await.0,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn export_is_gzip_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        call(&app, "/file/id?submittedFileId=f1&create=true").await;
        call(&app, "/file/id?submittedFileId=f2&create=true").await;

        let response = app
            .clone()
            .oneshot(Request::get("/file/export").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/gzip");

        let archive = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut tsv = String::new();
        GzDecoder::new(archive.as_ref()).read_to_string(&mut tsv).unwrap();
        assert_eq!(tsv, "1\tf1\n2\tf2\n");
    }

    #[tokio::test]
    async fn objects_have_no_export() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(call(&app(&dir), "/object/export").await.0, StatusCode::NOT_FOUND);
    }
}
