use super::*;

#[test]
fn parses_collect_with_defaults() {
    let cli = Cli::try_parse_from(["rvrank", "collect", "--zip", "60616"])
        .expect("expected valid cli args");

    match cli.command {
        Commands::Collect {
            zips,
            categories,
            condition,
            radius,
            output,
        } => {
            assert_eq!(zips, ["60616"]);
            assert!(categories.is_empty());
            assert_eq!(condition, Condition::New);
            assert_eq!(radius, 50);
            assert!(output.is_none());
        }
        other => panic!("expected collect, got {other:?}"),
    }
}

#[test]
fn parses_collect_with_repeated_filters() {
    let cli = Cli::try_parse_from([
        "rvrank",
        "collect",
        "--zip",
        "60616",
        "--zip",
        "10001",
        "--category",
        "Class B",
        "--category",
        "Toy Hauler",
        "--condition",
        "U",
        "--radius",
        "100",
        "--output",
        "out.json",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Commands::Collect {
            ref zips,
            ref categories,
            condition: Condition::Used,
            radius: 100,
            output: Some(_),
        } if zips.len() == 2 && categories.len() == 2
    ));
}

#[test]
fn collect_requires_a_zip() {
    assert!(Cli::try_parse_from(["rvrank", "collect"]).is_err());
}

#[test]
fn collect_rejects_unknown_condition() {
    assert!(Cli::try_parse_from(["rvrank", "collect", "--zip", "1", "--condition", "X"]).is_err());
}

#[test]
fn parses_engagement_flags() {
    let cli = Cli::try_parse_from([
        "rvrank",
        "engagement",
        "--input",
        "output/ranked_listings_1.json",
        "--limit",
        "10",
        "--refresh-cookies",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Commands::Engagement {
            input: Some(_),
            limit: Some(10),
            refresh_cookies: true,
            output: None,
        }
    ));
}

#[test]
fn engagement_defaults() {
    let cli = Cli::try_parse_from(["rvrank", "engagement"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Engagement {
            input: None,
            limit: None,
            refresh_cookies: false,
            output: None,
        }
    ));
}
