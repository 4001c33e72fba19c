fn main() -> std::process::ExitCode {
    clinidash_lib::run()
}
