use axum::Router;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::auctions::create_auction,
        crate::routes::auctions::list_auctions,
        crate::routes::auctions::get_auction,
        crate::routes::bids::place_bid,
        crate::routes::bids::list_bids,
        crate::routes::bids::my_bid,
        crate::routes::users::get_profile,
        crate::routes::users::get_balance,
        crate::routes::users::list_transactions,
    ),
    info(
        title = "Star Gift Auction API",
        description = "Multi-round sealed-ascending auctions over stars and gifts"
    )
)]
/// The OpenAPI spec for the auction service
pub struct AuctionApi;

pub fn openapi_router() -> Router {
    RapiDoc::with_url("/rapidoc", "/api-docs/openapi.json", AuctionApi::openapi()).into()
}
