fn main() -> anyhow::Result<()> {
    namada_installer::run()
}
