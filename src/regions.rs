// 🗺️ City → Region/MRC Lookup Table
// Static reference data: resolves a free-text city name to its administrative
// region and MRC (county-equivalent). Read-only at runtime — built once at
// first use, never mutated during a run.

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// CITY LOCATION
// ============================================================================

/// A resolved city location (region + MRC).
///
/// `region` is one of the 17 administrative regions of Quebec.
/// `mrc` is the municipalité régionale de comté (or agglomeration equivalent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityLocation {
    pub city: &'static str,
    pub region: &'static str,
    pub mrc: &'static str,
}

// ============================================================================
// STATIC TABLE
// ============================================================================

/// (city, region, MRC) triples for the cities that appear in REQ addresses.
///
/// Keys are matched case-insensitively; accents must match the official
/// municipal spelling ("Montréal", not "Montreal").
const CITY_TABLE: &[(&str, &str, &str)] = &[
    // Montréal agglomeration
    ("Montréal", "Montréal", "Agglomération de Montréal"),
    ("Montréal-Est", "Montréal", "Agglomération de Montréal"),
    ("Montréal-Ouest", "Montréal", "Agglomération de Montréal"),
    ("Westmount", "Montréal", "Agglomération de Montréal"),
    ("Outremont", "Montréal", "Agglomération de Montréal"),
    ("Verdun", "Montréal", "Agglomération de Montréal"),
    ("LaSalle", "Montréal", "Agglomération de Montréal"),
    ("Lachine", "Montréal", "Agglomération de Montréal"),
    ("Anjou", "Montréal", "Agglomération de Montréal"),
    ("Saint-Laurent", "Montréal", "Agglomération de Montréal"),
    ("Saint-Léonard", "Montréal", "Agglomération de Montréal"),
    ("Dollard-des-Ormeaux", "Montréal", "Agglomération de Montréal"),
    ("Pointe-Claire", "Montréal", "Agglomération de Montréal"),
    ("Dorval", "Montréal", "Agglomération de Montréal"),
    ("Kirkland", "Montréal", "Agglomération de Montréal"),
    ("Beaconsfield", "Montréal", "Agglomération de Montréal"),
    ("Côte-Saint-Luc", "Montréal", "Agglomération de Montréal"),
    ("Mont-Royal", "Montréal", "Agglomération de Montréal"),
    ("Pierrefonds", "Montréal", "Agglomération de Montréal"),
    // Laval (city = region = MRC-equivalent)
    ("Laval", "Laval", "Laval"),
    // Capitale-Nationale
    ("Québec", "Capitale-Nationale", "Agglomération de Québec"),
    ("L'Ancienne-Lorette", "Capitale-Nationale", "Agglomération de Québec"),
    ("Saint-Augustin-de-Desmaures", "Capitale-Nationale", "Agglomération de Québec"),
    ("Sainte-Foy", "Capitale-Nationale", "Agglomération de Québec"),
    ("Beauport", "Capitale-Nationale", "Agglomération de Québec"),
    ("Charlesbourg", "Capitale-Nationale", "Agglomération de Québec"),
    ("Baie-Saint-Paul", "Capitale-Nationale", "Charlevoix"),
    ("Pont-Rouge", "Capitale-Nationale", "Portneuf"),
    ("Donnacona", "Capitale-Nationale", "Portneuf"),
    // Montérégie
    ("Longueuil", "Montérégie", "Agglomération de Longueuil"),
    ("Brossard", "Montérégie", "Agglomération de Longueuil"),
    ("Saint-Lambert", "Montérégie", "Agglomération de Longueuil"),
    ("Boucherville", "Montérégie", "Agglomération de Longueuil"),
    ("Saint-Bruno-de-Montarville", "Montérégie", "Agglomération de Longueuil"),
    ("Saint-Hyacinthe", "Montérégie", "Les Maskoutains"),
    ("Saint-Jean-sur-Richelieu", "Montérégie", "Le Haut-Richelieu"),
    ("Châteauguay", "Montérégie", "Roussillon"),
    ("La Prairie", "Montérégie", "Roussillon"),
    ("Candiac", "Montérégie", "Roussillon"),
    ("Chambly", "Montérégie", "La Vallée-du-Richelieu"),
    ("Beloeil", "Montérégie", "La Vallée-du-Richelieu"),
    ("Granby", "Montérégie", "La Haute-Yamaska"),
    ("Sorel-Tracy", "Montérégie", "Pierre-De Saurel"),
    ("Salaberry-de-Valleyfield", "Montérégie", "Beauharnois-Salaberry"),
    ("Vaudreuil-Dorion", "Montérégie", "Vaudreuil-Soulanges"),
    ("Saint-Constant", "Montérégie", "Roussillon"),
    ("Varennes", "Montérégie", "Marguerite-D'Youville"),
    // Laurentides
    ("Saint-Jérôme", "Laurentides", "La Rivière-du-Nord"),
    ("Blainville", "Laurentides", "Thérèse-De Blainville"),
    ("Boisbriand", "Laurentides", "Thérèse-De Blainville"),
    ("Sainte-Thérèse", "Laurentides", "Thérèse-De Blainville"),
    ("Mirabel", "Laurentides", "Mirabel"),
    ("Saint-Eustache", "Laurentides", "Deux-Montagnes"),
    ("Mont-Tremblant", "Laurentides", "Les Laurentides"),
    ("Sainte-Agathe-des-Monts", "Laurentides", "Les Laurentides"),
    ("Lachute", "Laurentides", "Argenteuil"),
    // Lanaudière
    ("Terrebonne", "Lanaudière", "Les Moulins"),
    ("Mascouche", "Lanaudière", "Les Moulins"),
    ("Repentigny", "Lanaudière", "L'Assomption"),
    ("L'Assomption", "Lanaudière", "L'Assomption"),
    ("Joliette", "Lanaudière", "Joliette"),
    ("Rawdon", "Lanaudière", "Matawinie"),
    // Outaouais
    ("Gatineau", "Outaouais", "Gatineau"),
    ("Hull", "Outaouais", "Gatineau"),
    ("Aylmer", "Outaouais", "Gatineau"),
    ("Maniwaki", "Outaouais", "La Vallée-de-la-Gatineau"),
    // Estrie
    ("Sherbrooke", "Estrie", "Sherbrooke"),
    ("Magog", "Estrie", "Memphrémagog"),
    ("Coaticook", "Estrie", "Coaticook"),
    ("Lac-Mégantic", "Estrie", "Le Granit"),
    // Mauricie
    ("Trois-Rivières", "Mauricie", "Trois-Rivières"),
    ("Shawinigan", "Mauricie", "Shawinigan"),
    ("La Tuque", "Mauricie", "La Tuque"),
    ("Louiseville", "Mauricie", "Maskinongé"),
    // Saguenay–Lac-Saint-Jean
    ("Saguenay", "Saguenay–Lac-Saint-Jean", "Saguenay"),
    ("Chicoutimi", "Saguenay–Lac-Saint-Jean", "Saguenay"),
    ("Jonquière", "Saguenay–Lac-Saint-Jean", "Saguenay"),
    ("Alma", "Saguenay–Lac-Saint-Jean", "Lac-Saint-Jean-Est"),
    ("Roberval", "Saguenay–Lac-Saint-Jean", "Le Domaine-du-Roy"),
    ("Dolbeau-Mistassini", "Saguenay–Lac-Saint-Jean", "Maria-Chapdelaine"),
    // Chaudière-Appalaches
    ("Lévis", "Chaudière-Appalaches", "Lévis"),
    ("Saint-Georges", "Chaudière-Appalaches", "Beauce-Sartigan"),
    ("Thetford Mines", "Chaudière-Appalaches", "Les Appalaches"),
    ("Montmagny", "Chaudière-Appalaches", "Montmagny"),
    ("Sainte-Marie", "Chaudière-Appalaches", "La Nouvelle-Beauce"),
    // Centre-du-Québec
    ("Drummondville", "Centre-du-Québec", "Drummond"),
    ("Victoriaville", "Centre-du-Québec", "Arthabaska"),
    ("Bécancour", "Centre-du-Québec", "Bécancour"),
    ("Nicolet", "Centre-du-Québec", "Nicolet-Yamaska"),
    // Bas-Saint-Laurent
    ("Rimouski", "Bas-Saint-Laurent", "Rimouski-Neigette"),
    ("Rivière-du-Loup", "Bas-Saint-Laurent", "Rivière-du-Loup"),
    ("Matane", "Bas-Saint-Laurent", "La Matanie"),
    ("Amqui", "Bas-Saint-Laurent", "La Matapédia"),
    // Abitibi-Témiscamingue
    ("Rouyn-Noranda", "Abitibi-Témiscamingue", "Rouyn-Noranda"),
    ("Val-d'Or", "Abitibi-Témiscamingue", "La Vallée-de-l'Or"),
    ("Amos", "Abitibi-Témiscamingue", "Abitibi"),
    ("La Sarre", "Abitibi-Témiscamingue", "Abitibi-Ouest"),
    // Côte-Nord
    ("Sept-Îles", "Côte-Nord", "Sept-Rivières"),
    ("Baie-Comeau", "Côte-Nord", "Manicouagan"),
    ("Port-Cartier", "Côte-Nord", "Sept-Rivières"),
    // Gaspésie–Îles-de-la-Madeleine
    ("Gaspé", "Gaspésie–Îles-de-la-Madeleine", "La Côte-de-Gaspé"),
    ("Chandler", "Gaspésie–Îles-de-la-Madeleine", "Le Rocher-Percé"),
    ("Carleton-sur-Mer", "Gaspésie–Îles-de-la-Madeleine", "Avignon"),
    ("Les Îles-de-la-Madeleine", "Gaspésie–Îles-de-la-Madeleine", "Les Îles-de-la-Madeleine"),
    // Nord-du-Québec
    ("Chibougamau", "Nord-du-Québec", "Jamésie"),
    ("Lebel-sur-Quévillon", "Nord-du-Québec", "Jamésie"),
];

// ============================================================================
// LOOKUP
// ============================================================================

/// Index keyed by uppercased city name, built once on first lookup.
fn city_index() -> &'static HashMap<String, CityLocation> {
    static INDEX: OnceLock<HashMap<String, CityLocation>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut map = HashMap::with_capacity(CITY_TABLE.len());
        for &(city, region, mrc) in CITY_TABLE {
            map.insert(city.to_uppercase(), CityLocation { city, region, mrc });
        }
        map
    })
}

/// Resolve a city name to its region and MRC.
///
/// Matching is case-insensitive ("LAVAL" in a REQ address line matches
/// "Laval"). Returns None for unmapped cities — the caller counts the miss
/// and leaves the region/MRC fields null; this is NOT an error.
pub fn lookup_city(name: &str) -> Option<&'static CityLocation> {
    let key = name.trim().to_uppercase();
    if key.is_empty() {
        return None;
    }
    city_index().get(&key)
}

/// Number of cities in the static table (for startup diagnostics).
pub fn city_count() -> usize {
    CITY_TABLE.len()
}

// ============================================================================
// TESTS
// ============================================================================
