//! Link commands

use colored::Colorize;

use crate::cli::LinkAddArgs;
use crate::interfaces::cli::CliError;
use crate::storage::{Link, LinkStore};
use crate::utils::url_validator::{UrlValidationError, validate_app_url, validate_web_url};
use crate::utils::{generate_random_code, is_valid_link_code};

const RANDOM_CODE_LENGTH: usize = 8;

fn check(
    field: &str,
    value: &Option<String>,
    validate: fn(&str) -> Result<(), UrlValidationError>,
) -> Result<(), CliError> {
    match value {
        Some(url) => validate(url).map_err(|e| CliError::ParseError(format!("{}: {}", field, e))),
        None => Ok(()),
    }
}

/// 校验参数并组装 Link
pub(crate) fn build_link(args: LinkAddArgs) -> Result<(Link, bool), CliError> {
    let (code, generated) = match args.code {
        Some(code) => (code, false),
        None => (generate_random_code(RANDOM_CODE_LENGTH), true),
    };
    if !is_valid_link_code(&code) {
        return Err(CliError::ParseError(format!(
            "Invalid link code '{}': use 1-128 of [A-Za-z0-9._-]",
            code
        )));
    }

    check("--web", &args.web_url, validate_web_url)?;
    check("--ios-store", &args.ios_store_url, validate_web_url)?;
    check("--android-store", &args.android_store_url, validate_web_url)?;
    check("--ios-app", &args.ios_app_url, validate_app_url)?;
    check("--android-app", &args.android_app_url, validate_app_url)?;

    if args.web_url.is_none() && args.ios_store_url.is_none() && args.android_store_url.is_none()
    {
        return Err(CliError::ParseError(
            "At least one of --web, --ios-store, --android-store is required".to_string(),
        ));
    }

    let mut link = Link::new(code);
    link.web_url = args.web_url;
    link.ios_store_url = args.ios_store_url;
    link.android_store_url = args.android_store_url;
    link.ios_app_url = args.ios_app_url;
    link.android_app_url = args.android_app_url;
    link.deep_path = args.deep_path;
    link.campaign = args.campaign;
    link.source = args.source;
    Ok((link, generated))
}

pub async fn add_link(links: &dyn LinkStore, args: LinkAddArgs) -> Result<(), CliError> {
    let (link, generated) = build_link(args)?;

    links
        .upsert_link(&link)
        .await
        .map_err(|e| CliError::StorageError(format!("Failed to save link: {}", e)))?;

    if generated {
        println!(
            "{} Generated random code: {}",
            "ℹ".bold().blue(),
            link.id.magenta()
        );
    }
    println!("{} Saved link: {}", "✓".bold().green(), link.id.cyan());
    print_link(&link);
    Ok(())
}

pub async fn show_link(links: &dyn LinkStore, code: &str) -> Result<(), CliError> {
    match links.get_link(code).await? {
        Some(link) => {
            println!("{} {}", "Link".bold().green(), link.id.cyan());
            print_link(&link);
            Ok(())
        }
        None => Err(CliError::NotFound(code.to_string())),
    }
}

fn print_link(link: &Link) {
    let rows = [
        ("web", &link.web_url),
        ("ios store", &link.ios_store_url),
        ("android store", &link.android_store_url),
        ("ios app", &link.ios_app_url),
        ("android app", &link.android_app_url),
        ("deep path", &link.deep_path),
        ("campaign", &link.campaign),
        ("source", &link.source),
    ];
    for (label, value) in rows {
        if let Some(value) = value {
            println!("  {:<14} {}", label.dimmed(), value.blue());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_link_generates_code() {
        let args = LinkAddArgs {
            web_url: Some("https://example.com/promo".into()),
            ios_app_url: Some("myapp://".into()),
            ..Default::default()
        };
        let (link, generated) = build_link(args).unwrap();
        assert!(generated);
        assert_eq!(link.id.len(), RANDOM_CODE_LENGTH);
        assert_eq!(link.ios_app_url.as_deref(), Some("myapp://"));
    }

    #[test]
    fn test_build_link_rejects_bad_input() {
        let no_destination = LinkAddArgs {
            code: Some("promo".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_link(no_destination),
            Err(CliError::ParseError(_))
        ));

        let store_scheme = LinkAddArgs {
            code: Some("promo".into()),
            ios_store_url: Some("itms-apps://apps.apple.com/app/id1".into()),
            ..Default::default()
        };
        assert!(build_link(store_scheme).is_err());

        let bad_code = LinkAddArgs {
            code: Some("a/b".into()),
            web_url: Some("https://example.com".into()),
            ..Default::default()
        };
        assert!(build_link(bad_code).is_err());
    }
}
