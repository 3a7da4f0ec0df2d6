use crate::{
    api::{leave_request, payroll},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{guard, web};
use anyhow::anyhow;
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-client request budgets, one for reads and a tighter one for writes.
#[derive(Clone)]
pub struct RateLimits {
    read: Limiter,
    mutation: Limiter,
}

impl RateLimits {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            read: build_limiter(config.rate_read_per_min)?,
            mutation: build_limiter(config.rate_mutation_per_min)?,
        })
    }
}

fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("rate limit must be above zero, got {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

pub fn configure(cfg: &mut web::ServiceConfig, prefix: &str, limits: &RateLimits) {
    cfg.service(
        web::scope(prefix)
            .service(
                web::scope("/payroll")
                    // /payroll/groups
                    .service(
                        web::resource("/groups")
                            .wrap(limits.read.clone())
                            .route(web::get().to(payroll::list_groups)),
                    )
                    // /payroll/groups/current
                    .service(
                        web::resource("/groups/current")
                            .wrap(limits.read.clone())
                            .route(web::get().to(payroll::current_groups)),
                    )
                    // /payroll/groups/mutations
                    .service(
                        web::resource("/groups/mutations")
                            .wrap(limits.mutation.clone())
                            .route(web::post().to(payroll::mutate_groups)),
                    )
                    // /payroll/payslips
                    .service(
                        web::resource("/payslips")
                            .wrap(limits.read.clone())
                            .route(web::post().to(payroll::payslips)),
                    ),
            )
            .service(
                web::scope("/leave")
                    // /leave
                    .service(
                        web::resource("")
                            .guard(guard::Get())
                            .wrap(limits.read.clone())
                            .route(web::get().to(leave_request::leave_list)),
                    )
                    .service(
                        web::resource("")
                            .guard(guard::Post())
                            .wrap(limits.mutation.clone())
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    // /leave/balance/{employee_id}
                    .service(
                        web::resource("/balance/{employee_id}")
                            .wrap(limits.read.clone())
                            .route(web::get().to(leave_request::leave_balance)),
                    )
                    // /leave/{id}/approve
                    .service(
                        web::resource("/{id}/approve")
                            .wrap(limits.mutation.clone())
                            .route(web::put().to(leave_request::approve_leave)),
                    )
                    // /leave/{id}/reject
                    .service(
                        web::resource("/{id}/reject")
                            .wrap(limits.mutation.clone())
                            .route(web::put().to(leave_request::reject_leave)),
                    ),
            ),
    );
}
