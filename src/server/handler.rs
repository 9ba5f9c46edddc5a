//! Scheduler-extender HTTP surface (C8), mirroring the Go source's
//! `SchedExtenderHandler.ServeHTTP`: one entry point, dispatched by
//! substring containment on the request path rather than exact route
//! matching (so e.g. `/scheduler/filter/extra` still reaches `filter`).

use std::sync::Arc;

use warp::http::StatusCode;
use warp::{Filter as WarpFilter, Rejection, Reply};

use crate::algorithm::Filter;
use crate::metrics;
use crate::server::api::{ExtenderArgs, ExtenderBindingArgs, ExtenderBindingResult, ExtenderFilterResult};

/// Builds the full extender filter tree. When `debug` is set, the raw
/// request body is logged before dispatch, mirroring `LoggingDecorator`.
pub fn routes(
    filter: Arc<dyn Filter>,
    debug: bool,
) -> impl WarpFilter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::post()
        .and(warp::path::full())
        .and(warp::body::bytes())
        .and_then(move |path: warp::path::FullPath, body: bytes::Bytes| {
            let filter = filter.clone();
            async move {
                if debug {
                    tracing::debug!(path = path.as_str(), body = %String::from_utf8_lossy(&body), "> extender request");
                }
                Ok::<_, std::convert::Infallible>(dispatch(&filter, path.as_str(), &body))
            }
        })
}

fn dispatch(filter: &Arc<dyn Filter>, path: &str, body: &[u8]) -> warp::reply::Response {
    if path.contains("filter") {
        process_filter(filter, body)
    } else if path.contains("prioritize") {
        process_prioritize(body)
    } else if path.contains("bind") {
        process_bind(body)
    } else {
        warp::reply::with_status("Unsupported request", StatusCode::NOT_FOUND).into_response()
    }
}

fn process_filter(filter: &Arc<dyn Filter>, body: &[u8]) -> warp::reply::Response {
    let timer = metrics::start_extender_request("filter");

    let args: ExtenderArgs = match serde_json::from_slice(body) {
        Ok(args) => args,
        Err(err) => {
            tracing::warn!(error = %err, "extender: filter decode error");
            timer.finish(false);
            return bad_request(&err.to_string());
        }
    };

    let Some(node_names) = args.node_names else {
        tracing::warn!("extender: filter request missing node_names");
        timer.finish(false);
        return bad_request("node_names is nil");
    };

    match filter.filter(&args.pod, &node_names) {
        Ok(node_names) => {
            timer.finish(true);
            warp::reply::json(&ExtenderFilterResult { node_names }).into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "extender: filter error");
            timer.finish(false);
            bad_request(&err.to_string())
        }
    }
}

fn process_prioritize(body: &[u8]) -> warp::reply::Response {
    let timer = metrics::start_extender_request("prioritize");

    if let Err(err) = serde_json::from_slice::<ExtenderArgs>(body) {
        tracing::warn!(error = %err, "extender: prioritize decode error");
        timer.finish(false);
        return bad_request(&err.to_string());
    }

    // This plugin expresses every constraint as a hard filter; there is
    // nothing to score (spec.md §1 Non-goals).
    timer.finish(true);
    warp::reply::json(&Vec::<()>::new()).into_response()
}

fn process_bind(body: &[u8]) -> warp::reply::Response {
    let timer = metrics::start_extender_request("bind");

    if let Err(err) = serde_json::from_slice::<ExtenderBindingArgs>(body) {
        tracing::warn!(error = %err, "extender: bind decode error");
        timer.finish(false);
        return bad_request(&err.to_string());
    }

    timer.finish(true);
    warp::reply::json(&ExtenderBindingResult::default()).into_response()
}

fn bad_request(message: &str) -> warp::reply::Response {
    warp::reply::with_status(message.to_string(), StatusCode::BAD_REQUEST).into_response()
}
