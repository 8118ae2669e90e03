// Status page request handlers
use actix_web::{web, HttpResponse};
use log::{debug, error};

use crate::app_state::AppState;
use crate::web::view::render_status_page;

/// Render the current durability status
/// Handles requests like: GET /
pub async fn durability_status_handler(app_state: web::Data<AppState>) -> HttpResponse {
    let snapshot = app_state.status.read();
    debug!("Rendering status page with {} records", snapshot.records.len());

    match render_status_page(&snapshot) {
        Ok(page) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(page),
        Err(e) => {
            error!("Status page rendering failed: {}", e);
            HttpResponse::InternalServerError().body("Status page rendering error")
        }
    }
}

/// Route table for the status server
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(durability_status_handler));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{CheckRecord, StatusStore};
    use actix_web::{http::StatusCode, test, App};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn app_state() -> (Arc<StatusStore>, web::Data<AppState>) {
        let status = Arc::new(StatusStore::new("testfile.bin", 11, Duration::from_secs(300)));
        let state = web::Data::new(AppState::new(Arc::clone(&status)));
        (status, state)
    }

    #[actix_web::test]
    async fn test_status_page_before_any_check() {
        let (_, state) = app_state();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );

        let body = test::read_body(resp).await;
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains("Current Percentage: 100%"));
        assert!(body.contains("Filename: testfile.bin"));
    }

    #[actix_web::test]
    async fn test_status_page_reflects_new_records() {
        let (status, state) = app_state();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        status.record(CheckRecord::success(1, Utc::now()));
        status.record(CheckRecord::failure(2, Utc::now(), "could not open object at \"x\""));

        let req = test::TestRequest::get().uri("/").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains("Current Percentage: 50%"));
        assert!(body.contains("could not open object at &"));
        assert!(!body.contains("could not open object at \"x\""));
    }

    #[actix_web::test]
    async fn test_only_root_is_served() {
        let (_, state) = app_state();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/stats.json").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_ne!(resp.status(), StatusCode::OK);
    }
}
