use transmitter_server::App;

#[tokio::main]
async fn main() {
    if let Err(e) = App::run().await {
        eprintln!("\nError: {e:#}\n");
        std::process::exit(1);
    }
}
