//! Engine builtins known to the compiler.
//!
//! A plain call that names neither a function in the same script nor one of
//! these builtins is a compile error. Method builtins are called on an
//! object (`self setorigin(...)`); some names exist in both sets.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Builtin functions callable without an object.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "abs",
    "acos",
    "ambientplay",
    "ambientstop",
    "angleclamp180",
    "anglestoforward",
    "anglestoright",
    "anglestoup",
    "announcement",
    "asin",
    "assert",
    "assertex",
    "assertmsg",
    "atan",
    "bullettrace",
    "bullettracepassed",
    "ceil",
    "closer",
    "cos",
    "distance",
    "distance2d",
    "distancesquared",
    "earthquake",
    "exitlevel",
    "float",
    "floor",
    "getallnodes",
    "getarraykeys",
    "getdvar",
    "getdvarfloat",
    "getdvarint",
    "getent",
    "getentarray",
    "getentbynum",
    "getfirstarraykey",
    "getlastarraykey",
    "getmatchrulesdata",
    "getnextarraykey",
    "getnode",
    "getnodearray",
    "getnumparts",
    "getstarttime",
    "getsubstr",
    "getteamplayersalive",
    "getteamscore",
    "gettime",
    "getweaponmodel",
    "int",
    "iprintln",
    "iprintlnbold",
    "isalive",
    "isarray",
    "isdefined",
    "isfloat",
    "isint",
    "isplayer",
    "isstring",
    "issubstr",
    "isvector",
    "length",
    "lengthsquared",
    "loadfx",
    "logprint",
    "makedvarserverinfo",
    "map_restart",
    "max",
    "min",
    "newhudelem",
    "newclienthudelem",
    "newteamhudelem",
    "physicstrace",
    "playfx",
    "playfxontag",
    "playloopedfx",
    "playsoundatpos",
    "precacheitem",
    "precachemenu",
    "precachemodel",
    "precacheshader",
    "precachestring",
    "print",
    "println",
    "radiusdamage",
    "randomfloat",
    "randomfloatrange",
    "randomint",
    "randomintrange",
    "setdvar",
    "setdvarifuninitialized",
    "setexpfog",
    "setteamscore",
    "sin",
    "sighttracepassed",
    "spawn",
    "spawnfx",
    "spawnstruct",
    "sqrt",
    "squared",
    "strtok",
    "tan",
    "tolower",
    "toupper",
    "triggerfx",
    "updateclientnames",
    "vectordot",
    "vectorcross",
    "vectornormalize",
    "vectortoangles",
    "visionsetnaked",
];

/// Builtin methods callable on an object.
pub const BUILTIN_METHODS: &[&str] = &[
    "allowads",
    "allowjump",
    "allowsprint",
    "attach",
    "attackbuttonpressed",
    "clearperks",
    "closeingamemenu",
    "closemenu",
    "delete",
    "detach",
    "disableweapons",
    "enableweapons",
    "freezecontrols",
    "getcurrentweapon",
    "getentitynumber",
    "getguid",
    "getorigin",
    "getplayerangles",
    "getstance",
    "getweaponslistall",
    "giveweapon",
    "givemaxammo",
    "hasperk",
    "hasweapon",
    "hide",
    "iprintln",
    "iprintlnbold",
    "isonground",
    "linkto",
    "moveto",
    "notsolid",
    "openmenu",
    "playlocalsound",
    "playsound",
    "rotateto",
    "setactionslot",
    "setcarddisplayslot",
    "setclientdvar",
    "setclientomnvar",
    "setcontents",
    "setmodel",
    "setorigin",
    "setperk",
    "setplayerangles",
    "setrank",
    "setspawnweapon",
    "setstance",
    "settext",
    "setvalue",
    "setshader",
    "show",
    "solid",
    "spawn",
    "suicide",
    "switchtoweapon",
    "takeallweapons",
    "takeweapon",
    "unlink",
    "unsetperk",
    "usebuttonpressed",
];

static FUNCTIONS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| BUILTIN_FUNCTIONS.iter().copied().collect());

static METHODS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| BUILTIN_METHODS.iter().copied().collect());

/// `name` is a lowercase identifier.
pub fn is_builtin_function(name: &str) -> bool {
    FUNCTIONS.contains(name)
}

/// `name` is a lowercase identifier.
pub fn is_builtin_method(name: &str) -> bool {
    METHODS.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lists_are_lowercase_and_unique() {
        for list in [BUILTIN_FUNCTIONS, BUILTIN_METHODS] {
            let unique: HashSet<_> = list.iter().collect();
            assert_eq!(unique.len(), list.len());
            assert!(list.iter().all(|n| *n == n.to_ascii_lowercase()));
        }
    }

    #[test]
    fn test_lookup() {
        assert!(is_builtin_function("isdefined"));
        assert!(!is_builtin_function("setorigin"));
        assert!(is_builtin_method("setorigin"));
        assert!(is_builtin_method("iprintln") && is_builtin_function("iprintln"));
    }
}
