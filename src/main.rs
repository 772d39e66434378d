fn main() -> std::process::ExitCode {
    markethand_lib::run()
}
