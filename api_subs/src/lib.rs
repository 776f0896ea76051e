use actix_web::web::{self};

pub mod routes {
    pub mod payment;
    pub mod subscription;
}

pub mod services {
    pub mod checkout;
    pub mod signature;
    pub mod subscription;
    pub mod webhook;
}

pub mod dtos {
    pub mod checkout;
    pub mod subscription;
    pub mod webhook;
}

pub mod models {
    pub mod event;
    pub mod plan;
}

/// Called by the provider, no session. Mount before `mount_pay()`.
pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/payment/webhook").service(routes::payment::post_webhook)
}

/// Mount behind the auth middleware.
pub fn mount_pay() -> actix_web::Scope {
    web::scope("/payment").service(routes::payment::post_create_checkout)
}

/// Mount behind the auth middleware.
pub fn mount_subscription() -> actix_web::Scope {
    web::scope("/subscription").service(routes::subscription::get_subscription)
}
