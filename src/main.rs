fn main() -> std::process::ExitCode {
    anichat_lib::run()
}
