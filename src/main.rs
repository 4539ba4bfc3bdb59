fn main() -> anyhow::Result<()> {
    seedscan::cli_main::main()
}
