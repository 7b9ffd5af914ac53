use crate::{api::attendance, config::Config, error::bad_input};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.clamp(1, 60_000);
    let per_ms = 60_000 / requests_per_min as u64;

    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("period and burst are clamped to non-zero");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _| bad_input(err)))
        .app_data(web::JsonConfig::default().error_handler(|err, _| bad_input(err)))
        .app_data(web::PathConfig::default().error_handler(|err, _| bad_input(err)));

    cfg.service(web::resource("/confirmation").route(web::get().to(attendance::confirmation)));

    cfg.service(
        web::scope(&config.api_prefix).service(
            web::scope("/attendance")
                // /attendance?date=YYYY-MM-DD
                .service(
                    web::resource("")
                        .wrap(build_limiter(config.rate_query_per_min))
                        .route(web::get().to(attendance::list_attendance)),
                )
                // /attendance/check-in
                .service(
                    web::resource("/check-in")
                        .wrap(build_limiter(config.rate_submit_per_min))
                        .route(web::post().to(attendance::check_in)),
                )
                // /attendance/report
                .service(
                    web::resource("/report")
                        .wrap(build_limiter(config.rate_query_per_min))
                        .route(web::get().to(attendance::report)),
                )
                // /attendance/report.csv
                .service(
                    web::resource("/report.csv")
                        .wrap(build_limiter(config.rate_query_per_min))
                        .route(web::get().to(attendance::export_report)),
                )
                // /attendance/{id}/check-out
                .service(
                    web::resource("/{id}/check-out")
                        .wrap(build_limiter(config.rate_submit_per_min))
                        .route(web::put().to(attendance::check_out)),
                ),
        ),
    );
}


// CHECK-IN FORM
//  └─ POST /api/attendance/check-in   (X-Device-Id + name)
//       └─ 201 → /confirmation

// CHECK-OUT SCREEN
//  ├─ GET /api/attendance              (today's list)
//  └─ PUT /api/attendance/{id}/check-out
//       └─ 200 → /confirmation

// REPORT
//  ├─ GET /api/attendance/report?start=&end=
//  └─ GET /api/attendance/report.csv?start=&end=
