use axum::{
    Router, middleware,
    routing::{delete, get, patch, post, put},
};

use crate::middleware::require_auth;
use crate::{AppState, comments, feed, friends, notifications, posts, reactions, users};

/// GET /health: liveness check (no auth).
pub async fn health() -> &'static str {
    "ok"
}

/// All API routes. Everything except `/health` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes: Router<AppState> = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        // Users
        .route("/users", post(users::create_me).get(users::list_users))
        .route("/users/me", get(users::get_me).patch(users::update_me))
        .route("/users/suggestions", get(users::suggestions))
        .route("/users/by-username/{username}", get(users::get_user_by_username))
        .route("/users/{user_id}", get(users::get_user))
        .route("/users/{user_id}/posts", get(users::user_posts))
        // Posts
        .route("/posts", post(posts::create_post).get(posts::list_posts))
        .route(
            "/posts/{post_id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        // Comments
        .route(
            "/posts/{post_id}/comments",
            post(comments::create_comment).get(comments::list_comments),
        )
        .route("/posts/{post_id}/comments/latest", get(comments::latest_comment))
        .route("/comments/{comment_id}/replies", get(comments::list_replies))
        .route(
            "/comments/{comment_id}",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        // Reactions
        .route(
            "/posts/{post_id}/reactions",
            put(reactions::react)
                .get(reactions::list_reactions)
                .delete(reactions::remove_reaction),
        )
        // Friends
        .route(
            "/friends/requests",
            post(friends::send_request).get(friends::list_requests),
        )
        .route(
            "/friends/requests/{request_id}",
            put(friends::respond_to_request).delete(friends::cancel_request),
        )
        .route("/friends", get(friends::list_friends))
        .route("/friends/status/{user_id}", get(friends::friendship_status))
        .route("/friends/{user_id}", delete(friends::remove_friend))
        // Feed
        .route("/feed", get(feed::home_feed))
        // Notifications
        .route(
            "/notifications",
            get(notifications::list_notifications).delete(notifications::delete_all),
        )
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route(
            "/notifications/{notification_id}",
            put(notifications::update_notification).delete(notifications::delete_notification),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public_routes.merge(protected_routes).with_state(state)
}
