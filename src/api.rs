use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::dashboard::{DashboardView, SharedSnapshot};
use crate::models::dto::{DetailRequest, OuiResponse};
use crate::view::SpeedView;

pub type SharedView = Arc<Mutex<SpeedView<DashboardView>>>;

#[derive(Clone)]
pub struct ApiState {
    pub view: SharedView,
    pub snapshot: SharedSnapshot,
}

#[derive(Debug, Deserialize)]
struct DetailQuery {
    #[serde(default = "default_column")]
    col: String,
    label: Option<String>,
}

fn default_column() -> String {
    "mac".to_string()
}

// Everything currently on the panel
#[get("/api/speed")]
async fn api_speed(state: web::Data<ApiState>) -> impl Responder {
    let snapshot = state.snapshot.read().clone();
    HttpResponse::Ok().json(snapshot)
}

// Host drill-down, the tooltip of the web panel
#[get("/api/host/{key}")]
async fn api_host(
    state: web::Data<ApiState>,
    key: web::Path<String>,
    query: web::Query<DetailQuery>,
) -> impl Responder {
    let query = query.into_inner();
    let request = DetailRequest {
        key: key.into_inner(),
        col: query.col,
        label: query.label,
    };
    let detail = state.view.lock().await.render_host_detail(&request);
    HttpResponse::Ok().json(detail)
}

#[get("/api/oui/{mac}")]
async fn api_oui(state: web::Data<ApiState>, mac: web::Path<String>) -> impl Responder {
    let mac = mac.into_inner();
    let vendor = state.view.lock().await.oui().lookup(&mac).map(str::to_string);
    HttpResponse::Ok().json(OuiResponse { mac, vendor })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(api_speed).service(api_host).service(api_oui);
}

pub fn serve(state: ApiState, addr: SocketAddr) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
    })
    .workers(1)
    .disable_signals()
    .bind(addr)?
    .run();

    tracing::info!(%addr, "HTTP API listening");
    Ok(server)
}
