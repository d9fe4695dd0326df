use anyhow::Result;
use romsmith_core::store::Store;
use romsmith_core::Settings;

pub fn run(store: &Store, key: Option<&str>, value: Option<&str>) -> Result<()> {
    let mut settings = Settings::load(store)?;
    match (key, value) {
        (None, _) => {
            for key in Settings::KEYS {
                let value = settings.get(key)?;
                let shown = if value.is_empty() { "auto" } else { value.as_str() };
                println!("{key} = {shown}");
            }
        }
        (Some(key), None) => println!("{}", settings.get(key)?),
        (Some(key), Some(value)) => {
            settings.set(key, value)?;
            settings.save(store)?;
            println!("{key} = {}", settings.get(key)?);
        }
    }
    Ok(())
}
