fn main() {
    if let Err(err) = recharge_home_api::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
