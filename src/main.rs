use anyhow::Result;

fn main() -> Result<()> {
    contrail::run()?;
    Ok(())
}
