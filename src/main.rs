fn main() -> anyhow::Result<()> {
    odakla_lib::run()
}
