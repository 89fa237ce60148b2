use rocket::Route;

mod results;
mod session;
mod voters;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(session::routes());
    routes.extend(voters::routes());
    routes.extend(results::routes());
    routes
}
