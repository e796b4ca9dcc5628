fn main() -> anyhow::Result<()> {
    submitter::cli::run()
}
