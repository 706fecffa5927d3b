use std::process::Command;

fn main() {
    // Only rebuild CSS when template or CSS files change
    println!("cargo:rerun-if-changed=assets/css/input.css");
    println!("cargo:rerun-if-changed=templates/");

    // Try to run Tailwind CSS standalone CLI
    let status = Command::new("tailwindcss")
        .args([
            "-i",
            "assets/css/input.css",
            "-o",
            "assets/css/output.css",
            "--minify",
        ])
        .status();

    match status {
        Ok(s) if s.success() => {
            println!("cargo:warning=Tailwind CSS compiled successfully");
        }
        _ => {
            // Tailwind CLI not available — create a minimal fallback CSS
            println!("cargo:warning=Tailwind CLI not found, using fallback CSS");
            let fallback = r#"*, *::before, *::after { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: system-ui, -apple-system, sans-serif; line-height: 1.6; color: #1c1917; background: #fafaf9; -webkit-font-smoothing: antialiased; }
.container { max-width: 56rem; margin: 0 auto; padding: 1rem; }
.flash { padding: 0.75rem 1rem; border-radius: 0.5rem; margin-bottom: 1rem; }
.flash-success { background: #ecfdf5; color: #065f46; }
.flash-error { background: #fef2f2; color: #991b1b; }
.card { background: #fff; border-radius: 0.75rem; border: 1px solid #e7e5e4; padding: 1.5rem; box-shadow: 0 1px 2px 0 rgb(0 0 0 / 0.05); margin-bottom: 1rem; }
.btn { display: inline-flex; align-items: center; padding: 0.5rem 1rem; border-radius: 0.5rem; font-size: 0.875rem; font-weight: 500; cursor: pointer; text-decoration: none; }
.btn-primary { background: #1c1917; color: #fff; border: none; }
.btn-primary:hover { background: #44403c; }
.btn-secondary { background: #fff; color: #1c1917; border: 1px solid #d6d3d1; }
nav { display: flex; align-items: center; justify-content: space-between; padding: 0.75rem 1rem; border-bottom: 1px solid #e7e5e4; }
nav a { margin-left: 0.75rem; color: inherit; text-decoration: none; }
form label { display: block; font-size: 0.875rem; font-weight: 500; margin-top: 0.75rem; }
form input, form textarea, form select { width: 100%; padding: 0.5rem; border: 1px solid #d6d3d1; border-radius: 0.5rem; margin-top: 0.25rem; }
.rating { color: #b45309; font-weight: 600; }
.muted { color: #78716c; font-size: 0.875rem; }
a { color: inherit; }
a:hover { opacity: 0.8; }
"#;
            std::fs::create_dir_all("assets/css").ok();
            std::fs::write("assets/css/output.css", fallback).ok();
        }
    }
}
