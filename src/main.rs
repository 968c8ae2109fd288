use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use jira_bridge::config::{self, AppConfigOverrides};
use jira_bridge::endpoint::{JiraEndpoint, LoggingSink};
use jira_bridge::fields::FieldSchemaCache;
use jira_bridge::jira::JiraApi;
use jira_bridge::logging;
use jira_bridge::metrics::{spawn_metrics_logger, Metrics};
use serde_json::Value;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cfg = config::load()?;
    cfg.apply_overrides(&AppConfigOverrides::from_env())?;

    let metrics = Arc::new(Metrics::new());
    spawn_metrics_logger(
        Arc::clone(&metrics),
        Duration::from_secs(cfg.metrics.interval_secs.max(1)),
    );

    let api = Arc::new(JiraApi::new(
        cfg.jira.base_url.clone(),
        cfg.jira.username.clone(),
        cfg.jira.api_token.clone(),
        Arc::clone(&metrics),
    )?);
    logging::info(format!(
        "starting jira-bridge username={} url={}",
        cfg.jira.username, api.base_url
    ));

    match api.myself() {
        Ok(me) => logging::info(format!(
            "jira identity name={:?} display_name={:?}",
            me["name"].as_str(),
            me["displayName"].as_str()
        )),
        Err(err) => logging::warn(format!("failed jira identity probe: {}", err)),
    }

    let fields = Arc::new(FieldSchemaCache::new(Arc::clone(&api), Arc::clone(&metrics)));
    let endpoint = Arc::new(JiraEndpoint::new(
        api,
        fields,
        cfg.jira.username.clone(),
        Arc::new(LoggingSink),
        metrics,
    ));

    // warm eagerly; a failure here just defers to lazy repair
    endpoint.warm_field_cache();

    serve_webhooks(&cfg.webhook.bind_addr, endpoint)
}

/// Accepts webhook POSTs and always answers success: retry storms from the
/// sender help nobody, failed events are logged and dropped instead.
fn serve_webhooks(
    bind_addr: &str,
    endpoint: Arc<JiraEndpoint>,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = tiny_http::Server::http(bind_addr)
        .map_err(|err| format!("failed to bind webhook listener on {}: {}", bind_addr, err))?;
    logging::info(format!("webhook listener on {}", bind_addr));

    for mut request in server.incoming_requests() {
        let mut raw = String::new();
        if let Err(err) = request.as_reader().read_to_string(&mut raw) {
            logging::warn(format!("failed reading webhook body: {}", err));
            respond_ok(request);
            continue;
        }

        let reply = match serde_json::from_str::<Value>(&raw) {
            Ok(body) => endpoint.handle_webhook(&body),
            Err(err) => {
                logging::warn(format!("discarded unparseable webhook body: {}", err));
                serde_json::json!({"status": "ok"})
            }
        };

        let response = tiny_http::Response::from_string(reply.to_string()).with_header(
            tiny_http::Header::from_bytes("Content-Type", "application/json")
                .expect("static header must parse"),
        );
        if let Err(err) = request.respond(response) {
            logging::warn(format!("failed to answer webhook request: {}", err));
        }
    }

    Ok(())
}

fn respond_ok(request: tiny_http::Request) {
    let response = tiny_http::Response::from_string("{\"status\":\"ok\"}").with_header(
        tiny_http::Header::from_bytes("Content-Type", "application/json")
            .expect("static header must parse"),
    );
    if let Err(err) = request.respond(response) {
        logging::warn(format!("failed to answer webhook request: {}", err));
    }
}
