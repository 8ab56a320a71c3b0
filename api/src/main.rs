#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    replay_history_api::run().await;
}
