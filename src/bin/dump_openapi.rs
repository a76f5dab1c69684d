use std::fs;

fn main() -> anyhow::Result<()> {
    let doc = mailcraft::docs::build_openapi(8000)?;
    let json = serde_json::to_string_pretty(&doc)?;
    let path = "openapi.json";
    fs::write(path, json)?;
    println!("wrote {}", path);
    Ok(())
}
