fn main() -> anyhow::Result<()> {
    focus_friends_lib::run()
}
