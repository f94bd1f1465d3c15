use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::logger::RequestLogger;
use crate::middleware::JwtMiddleware;
use crate::routes::{get_current_user, health_check, login, refresh, register, revoke};

pub fn run(listener: TcpListener, auth: AuthService) -> Result<Server, std::io::Error> {
    let signer = auth.signer().clone();
    let auth = web::Data::new(auth);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            .app_data(auth.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/revoke", web::post().to(revoke))
            // Protected routes
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(signer.clone()))
                    .route("/me", web::get().to(get_current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
