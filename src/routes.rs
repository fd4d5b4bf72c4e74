use crate::{
    api::{payroll, staff},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            (60_000 / requests_per_min as u64).max(1)
        };
        let cfg = GovernorConfigBuilder::default()
            .milliseconds_per_request(per_ms)
            .burst_size(requests_per_min.max(1))
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .expect("per_millisecond and burst_size are non-zero");
        Governor::new(&cfg)
    }

    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/payroll")
                    // /payroll
                    .service(
                        web::resource("")
                            .route(web::post().to(payroll::create_payroll))
                            .route(web::get().to(payroll::list_payrolls)),
                    )
                    // fixed segments before /{id} so they are not taken for ids
                    .service(
                        web::resource("/batch/{trigger}")
                            .route(web::post().to(payroll::transition_batch)),
                    )
                    .service(
                        web::resource("/release").route(web::post().to(payroll::release_payrolls)),
                    )
                    // /payroll/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(payroll::get_payroll))
                            .route(web::put().to(payroll::update_payroll)),
                    )
                    .service(
                        web::resource("/{id}/audit-trail")
                            .route(web::get().to(payroll::audit_trail)),
                    )
                    .service(
                        web::resource("/{id}/settle")
                            .route(web::post().to(payroll::settle_payroll)),
                    )
                    // /payroll/{id}/{trigger}
                    .service(
                        web::resource("/{id}/{trigger}")
                            .route(web::post().to(payroll::transition_payroll)),
                    ),
            )
            .service(
                web::scope("/staff")
                    .service(
                        web::resource("/undisbursed").route(web::get().to(staff::list_undisbursed)),
                    )
                    .service(
                        web::resource("/basic-disbursement")
                            .route(web::post().to(staff::disburse_basic)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(staff::get_staff))),
            ),
    );
}
