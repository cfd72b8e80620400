//! The HTTP query surface: expand a name against a registry, or dump the
//! whole cache. Thin by design; everything interesting happens in the
//! lookup engine.
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::index::Family;
use crate::lookup;
use crate::rpsl::parse_asn;
use crate::supervisor::Registries;

pub fn router(registries: Registries) -> Router {
    Router::new()
        .route("/dump", get(dump))
        .route("/:registry/:name/v4", get(lookup_v4))
        .route("/:registry/:name/v6", get(lookup_v6))
        // unknown paths answer with an empty body
        .fallback(|| async { "" })
        .with_state(registries)
}

async fn lookup_v4(
    State(registries): State<Registries>,
    Path((registry, name)): Path<(String, String)>,
) -> Response {
    answer(registries, registry, name, Family::V4).await
}

async fn lookup_v6(
    State(registries): State<Registries>,
    Path((registry, name)): Path<(String, String)>,
) -> Response {
    answer(registries, registry, name, Family::V6).await
}

async fn answer(registries: Registries, registry: String, name: String, family: Family) -> Response {
    let map = registries.read().await;
    let index = match map.get(&registry) {
        Some(index) => index,
        None => {
            return (StatusCode::NOT_FOUND, format!("unknown registry {}\n", registry))
                .into_response()
        }
    };
    let index = index.read().await;

    // a direct ASN answers with the raw bucket
    if parse_asn(&name.to_uppercase()).is_some() {
        let exp = lookup::expand(&index, &name, family);
        return Json(exp.prefixes).into_response();
    }

    let exp = lookup::expand(&index, &name, family);
    Json(json!({
        "prefixes": exp.prefixes,
        "macros": exp.macros,
        "prefixCount": exp.prefixes.len(),
    }))
    .into_response()
}

async fn dump(State(registries): State<Registries>) -> Response {
    let map = registries.read().await;
    let mut out = Map::new();
    for (name, index) in map.iter() {
        let index = index.read().await;
        match serde_json::to_value(&*index) {
            Ok(value) => {
                out.insert(name.clone(), value);
            }
            Err(e) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("dump failed: {}\n", e),
                )
                    .into_response()
            }
        }
    }
    Json(Value::Object(out)).into_response()
}
