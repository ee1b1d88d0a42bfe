use console::Style;
use subpipe_core::pipeline::config::PipelineConfig;
use subpipe_core::pipeline::{BatchLedger, BatchRequest, WorkdirMode};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    ok: Style,
    failed: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            ok: Style::new().green(),
            failed: Style::new().red().bold(),
        }
    }
}

fn rule(s: &Styles, width: usize) {
    println!("  {}", s.title.apply_to("\u{2550}".repeat(width)));
}

pub fn print_batch_summary(config: &PipelineConfig, request: &BatchRequest) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Subtraction Pipeline"));
    rule(&s, 20);
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Images"),
        s.value.apply_to(request.images.len())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Template"),
        s.path.apply_to(request.template.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Work dir"),
        s.path.apply_to(request.workdir.display())
    );
    if request.mode == WorkdirMode::Update {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Mode"),
            s.method.apply_to("update")
        );
    }
    println!();

    let cleaning = &config.cleaning;
    println!("  {}", s.header.apply_to("Cleaning"));
    println!(
        "    {:<16}{}",
        s.label.apply_to("Template"),
        s.method.apply_to(cleaning.template_policy())
    );
    println!(
        "    {:<16}{}",
        s.label.apply_to("CR iterations"),
        s.value.apply_to(format!(
            "image {}, template {}",
            cleaning.image_iterations, cleaning.template_iterations
        ))
    );
    optional_path(&s, "Fringe frame", cleaning.fringe_frame.as_deref());
    optional_path(&s, "Bad pixel mask", cleaning.bad_pixel_mask.as_deref());
    if cleaning.trim > 0 {
        println!(
            "    {:<16}{}",
            s.label.apply_to("Trim"),
            s.value.apply_to(format!("{} px", cleaning.trim))
        );
    }
    println!();

    let align = &config.alignment;
    println!("  {}", s.header.apply_to("Alignment"));
    if align.prealigned {
        println!("    {}", s.disabled.apply_to("frames declared prealigned"));
    } else {
        println!(
            "    {:<16}{}",
            s.label.apply_to("Matching"),
            if align.coordinate_matching {
                s.method.apply_to(format!(
                    "tolerance {}, min {} matches, radius {}",
                    align.tolerance, align.min_matches, align.search_radius
                ))
            } else {
                s.disabled.apply_to("disabled".to_string())
            }
        );
        println!(
            "    {:<16}{}",
            s.label.apply_to("Frame resample"),
            if align.frame_resampling {
                s.method.apply_to("enabled")
            } else {
                s.disabled.apply_to("disabled")
            }
        );
    }
    println!();

    let diff = &config.differencing;
    println!("  {}", s.header.apply_to("Differencing"));
    println!(
        "    {:<16}{}",
        s.label.apply_to("Direction"),
        s.method.apply_to(config.direction_hint)
    );
    println!(
        "    {:<16}{}",
        s.label.apply_to("Kernel sum"),
        s.value
            .apply_to(format!("[{}, {}]", diff.min_sum_kernel, diff.max_sum_kernel))
    );
    println!(
        "    {:<16}{}",
        s.label.apply_to("Adaptive"),
        if diff.adapt {
            s.method.apply_to("yes")
        } else {
            s.disabled.apply_to("no")
        }
    );
    optional_path(&s, "Stamps", config.stamps.as_deref());
    println!();
}

fn optional_path(s: &Styles, label: &str, path: Option<&std::path::Path>) {
    if let Some(p) = path {
        println!(
            "    {:<16}{}",
            s.label.apply_to(label),
            s.path.apply_to(p.display())
        );
    }
}

fn num(v: Option<f64>, precision: usize) -> String {
    v.map_or_else(|| "-".into(), |v| format!("{v:.precision$}"))
}

/// One line per ledger entry, followed by a success count.
pub fn print_ledger(ledger: &BatchLedger) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Results"));
    rule(&s, 7);
    println!(
        "  {}",
        s.label.apply_to(format!(
            "{:<28} {:<10} {:>6} {:>6} {:<24} {:>7} {:>4} {:>9} {:>10} {:>4}",
            "Image", "Object", "iFWHM", "tFWHM", "Aligned", "Ratio", "Rev", "subSTD", "KernelSum", "Code"
        ))
    );

    for e in ledger.entries() {
        let reverse = match e.reverse {
            Some(true) => "YES",
            Some(false) => "NO",
            None => "-",
        };
        let line = format!(
            "{:<28} {:<10} {:>6} {:>6} {:<24} {:>7} {:>4} {:>9} {:>10} {:>4}",
            truncate(&e.image, 28),
            truncate(&e.object, 10),
            num(e.image_fwhm, 2),
            num(e.template_fwhm, 2),
            truncate(&e.aligned, 24),
            num(e.seeing_ratio, 3),
            reverse,
            num(e.sub_stddev, 2),
            num(e.kernel_sum, 4),
            e.fail_code,
        );
        let style = if e.fail_code == 0 { &s.ok } else { &s.failed };
        println!("  {}", style.apply_to(line));
    }

    println!();
    let failed = ledger.failures();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Succeeded"),
        s.value.apply_to(format!("{}/{}", ledger.len() - failed, ledger.len()))
    );
    if failed > 0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Failed"),
            s.failed.apply_to(failed)
        );
    }
    println!();
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}
