use anyhow::{anyhow, Context, Result};
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::report::{ReportName, Semester};

const YEAR_SELECT_ID: &str = "ctl00_plcMain_lstGradYear";
const COLLEGE_SELECT_ID: &str = "ctl00_plcMain_lstGradCollege";

pub struct Listing {
    pub years: Vec<u16>,
    pub colleges: Vec<String>,
}

/// Fetch the registrar's report page and read its year and college dropdowns.
pub async fn fetch_listing(client: &reqwest::Client, root_url: &str) -> Result<Listing> {
    info!("Fetching report listing: {}", root_url);
    let html = client
        .get(root_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .context("Failed to fetch report listing")?;

    let listing = parse_listing(&html)?;
    info!(
        "Found {} years and {} colleges",
        listing.years.len(),
        listing.colleges.len()
    );
    Ok(listing)
}

pub fn parse_listing(html: &str) -> Result<Listing> {
    let document = Html::parse_document(html);
    let years = select_options(&document, YEAR_SELECT_ID)?
        .into_iter()
        .filter_map(|v| match v.parse() {
            Ok(year) => Some(year),
            Err(_) => {
                warn!("Skipping non-numeric year option {:?}", v);
                None
            }
        })
        .collect();
    let colleges = select_options(&document, COLLEGE_SELECT_ID)?;
    Ok(Listing { years, colleges })
}

/// Option `value`s of the `<select>` with the given id, in page order.
fn select_options(document: &Html, select_id: &str) -> Result<Vec<String>> {
    let select = selector(&format!("select#{}", select_id))?;
    let option = selector("option")?;

    let dropdown = document
        .select(&select)
        .next()
        .with_context(|| format!("No <select id=\"{}\"> on listing page", select_id))?;

    Ok(dropdown
        .select(&option)
        .filter_map(|o| o.value().attr("value"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {:?}: {:?}", css, e))
}

/// Every (url, report) pair for each year, semester and college.
pub fn report_targets(listing: &Listing, pdf_base_url: &str) -> Vec<(String, ReportName)> {
    let mut targets = Vec::new();
    for &year in &listing.years {
        for semester in Semester::ALL {
            for college in &listing.colleges {
                let name = ReportName::new(year, semester, college);
                targets.push((name.url(pdf_base_url), name));
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<form>
  <select name="ctl00$plcMain$lstGradYear" id="ctl00_plcMain_lstGradYear" class="x">
    <option selected="selected" value="2018">2018</option>
    <option value="2017">2017</option>
    <option value="">-- choose --</option>
    <option value="all">All</option>
  </select>
  <select name="ctl00$plcMain$lstGradCollege" id="ctl00_plcMain_lstGradCollege">
    <option value="AG">Agriculture</option>
    <option value="EN">Engineering</option>
    <option value="GV">Galveston</option>
  </select>
</form>"#;

    #[test]
    fn reads_both_dropdowns() {
        let listing = parse_listing(PAGE).unwrap();
        assert_eq!(listing.years, vec![2018, 2017]);
        assert_eq!(listing.colleges, vec!["AG", "EN", "GV"]);
    }

    #[test]
    fn markup_quirks_do_not_leak_options() {
        let page = r#"
<!-- <select id="ctl00_plcMain_lstGradYear"><option value="1999">1999</option></select> -->
<SELECT ID=ctl00_plcMain_lstGradYear>
  <OPTION VALUE=' 2016 '>2016</OPTION>
  <option>no value</option>
  <optgroup label="older"><option value="2015">2015</option></optgroup>
</SELECT>
<select id="ctl00_plcMain_lstGradCollege"><option value='QT'>Qatar</option></select>"#;
        let listing = parse_listing(page).unwrap();
        assert_eq!(listing.years, vec![2016, 2015]);
        assert_eq!(listing.colleges, vec!["QT"]);
    }

    #[test]
    fn missing_select_is_an_error() {
        assert!(parse_listing("<html><body>maintenance</body></html>").is_err());
    }

    #[test]
    fn targets_cover_every_combination() {
        let listing = Listing {
            years: vec![2017],
            colleges: vec!["AG".into(), "EN".into()],
        };
        let targets = report_targets(&listing, "https://example.edu/PDFReports");
        assert_eq!(targets.len(), 6);
        assert_eq!(targets[0].0, "https://example.edu/PDFReports/20171/grd20171AG.pdf");
        assert_eq!(targets[5].1.filename(), "grd20173EN.pdf");
    }
}
