fn main() -> anyhow::Result<()> {
    sub_o_matic::run()
}
