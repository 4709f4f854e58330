fn main() -> anyhow::Result<()> {
    aff4_cli::run()
}
